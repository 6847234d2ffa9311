//! The polling loop that feeds samples into the state manager.

use anyhow::{Context, Result, bail};
use ethled_lib::bus::Bus;
use ethled_lib::sampler::{BandwidthSample, CounterSource, Sampler, SkipReason};
use ethled_lib::state::{StateManager, classify};
use ethled_lib::timing::{Clock, Delay};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Invalid samples in a row after which the daemon gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Usage figures cycled through by test mode, one per interval.
pub const TEST_MODE_USAGE: [f64; 4] = [5.0, 25.0, 60.0, 90.0];

/// Cooperative cancellation, checked between ticks only.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the trigger and the token observing it.
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for `duration` or until shutdown is requested, whichever comes
    /// first. Returns `true` on shutdown. A dropped trigger counts as one.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_triggered(),
            changed = self.rx.changed() => changed.is_err() || self.is_triggered(),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Applied { changed: bool },
    Skipped(SkipReason),
    UpdateFailed,
}

pub struct Monitor<S: CounterSource, C: Clock, B: Bus, D: Delay> {
    sampler: Sampler<S, C>,
    state: StateManager<B, D>,
    interval: Duration,
    failures: u32,
}

impl<S: CounterSource, C: Clock, B: Bus, D: Delay> Monitor<S, C, B, D> {
    /// `sampler` must already be initialized.
    pub fn new(sampler: Sampler<S, C>, state: StateManager<B, D>, interval: Duration) -> Self {
        Self {
            sampler,
            state,
            interval,
            failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn state(&self) -> &StateManager<B, D> {
        &self.state
    }

    pub fn into_state(self) -> StateManager<B, D> {
        self.state
    }

    /// Takes one sample and hands it to the state manager.
    ///
    /// A failed LED update is logged and retried on a later tick through the
    /// state manager's commit rule. Only a run of invalid samples is fatal.
    pub fn tick(&mut self) -> Result<Tick> {
        let sample = self.sampler.sample();
        if let Some(reason) = sample.skip {
            self.failures += 1;
            warn!(
                "Invalid bandwidth measurement: {} (failure {}/{})",
                reason, self.failures, MAX_CONSECUTIVE_FAILURES
            );
            if self.failures >= MAX_CONSECUTIVE_FAILURES {
                bail!("Too many consecutive bandwidth measurement failures");
            }
            return Ok(Tick::Skipped(reason));
        }

        self.failures = 0;
        debug!("{}", sample);
        match self.state.update(&sample) {
            Ok(changed) => Ok(Tick::Applied { changed }),
            Err(e) => {
                warn!("Failed to update LEDs: {}", e);
                Ok(Tick::UpdateFailed)
            }
        }
    }

    /// Ticks once per interval until shutdown. The first sample is taken a
    /// full interval after start so it covers a meaningful window.
    pub async fn run(&mut self, shutdown: &mut Shutdown) -> Result<()> {
        info!(
            "Monitoring interface {} (capacity: {} Mbps)",
            self.sampler.interface(),
            self.sampler.capacity_mbps()
        );
        while !shutdown.sleep(self.interval).await {
            self.tick()?;
        }
        info!("Monitoring stopped");
        Ok(())
    }
}

/// Cycles the panel through every tier with synthetic samples until
/// shutdown. Any failed update ends test mode.
pub async fn run_test_mode<B: Bus, D: Delay>(
    state: &mut StateManager<B, D>,
    interval: Duration,
    shutdown: &mut Shutdown,
) -> Result<()> {
    info!("Starting testing mode - cycling through bandwidth states");
    for &usage in TEST_MODE_USAGE.iter().cycle() {
        if shutdown.is_triggered() {
            break;
        }
        info!("Testing: {}% usage -> {}", usage, classify(usage, state.thresholds()));
        state
            .update(&BandwidthSample::from_usage(usage))
            .context("Failed to update LEDs in testing mode")?;
        if shutdown.sleep(interval).await {
            break;
        }
    }
    info!("Testing mode completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethled_lib::bus::MemoryBus;
    use ethled_lib::controller::LedController;
    use ethled_lib::frame::{Color, Command, Indicator};
    use ethled_lib::state::{Thresholds, Tier};
    use ethled_lib::timing::{ManualClock, RecordedDelay};
    use ethled_lib::LedError;
    use std::cell::Cell;
    use std::rc::Rc;

    const CAPACITY_MBPS: f64 = 1000.0;

    /// Each read moves the clock one second forward and the rx counter by
    /// the configured number of bytes. Reads fail while `rx` is `None`.
    #[derive(Clone)]
    struct TickingCounters {
        clock: ManualClock,
        rx: Rc<Cell<Option<u64>>>,
        per_read: Rc<Cell<u64>>,
    }

    impl TickingCounters {
        fn new(clock: ManualClock) -> Self {
            Self {
                clock,
                rx: Rc::new(Cell::new(Some(0))),
                per_read: Rc::new(Cell::new(0)),
            }
        }

        fn carry(&self, percent: f64) {
            self.per_read
                .set((CAPACITY_MBPS * 1_000_000.0 / 8.0 * percent / 100.0) as u64);
        }
    }

    impl CounterSource for TickingCounters {
        fn interface_exists(&self, _interface: &str) -> bool {
            true
        }

        fn read_counters(&self, interface: &str) -> Result<(u64, u64), LedError> {
            self.clock.advance(Duration::from_secs(1));
            let rx = self
                .rx
                .get()
                .ok_or_else(|| LedError::CountersUnavailable(interface.to_string()))?;
            let next = rx.wrapping_add(self.per_read.get());
            self.rx.set(Some(next));
            Ok((next, 0))
        }
    }

    type TestMonitor = Monitor<TickingCounters, ManualClock, MemoryBus, RecordedDelay>;

    fn monitor() -> (TestMonitor, TickingCounters) {
        let clock = ManualClock::new();
        let counters = TickingCounters::new(clock.clone());
        let mut sampler = Sampler::with_source("eth0", CAPACITY_MBPS, counters.clone(), clock);
        sampler.initialize().unwrap();
        let controller = LedController::new(MemoryBus::new(), RecordedDelay::new());
        let state = StateManager::new(controller, Thresholds::default(), 255);
        (Monitor::new(sampler, state, Duration::from_millis(1)), counters)
    }

    #[test]
    fn test_tick_applies_tier() {
        let (mut monitor, counters) = monitor();
        counters.carry(60.0);
        assert_eq!(monitor.tick().unwrap(), Tick::Applied { changed: true });
        assert_eq!(monitor.state().current_tier(), Tier::Medium);
        assert_eq!(monitor.tick().unwrap(), Tick::Applied { changed: false });
    }

    #[test]
    fn test_ten_invalid_samples_are_fatal() {
        let (mut monitor, counters) = monitor();
        counters.rx.set(None);
        for i in 1..MAX_CONSECUTIVE_FAILURES {
            assert_eq!(monitor.tick().unwrap(), Tick::Skipped(SkipReason::CountersUnavailable));
            assert_eq!(monitor.consecutive_failures(), i);
        }
        assert!(monitor.tick().is_err());
    }

    #[test]
    fn test_valid_sample_resets_failures() {
        let (mut monitor, counters) = monitor();
        counters.rx.set(None);
        for _ in 0..5 {
            monitor.tick().unwrap();
        }
        counters.rx.set(Some(0));
        monitor.tick().unwrap();
        assert_eq!(monitor.consecutive_failures(), 0);
    }

    #[test]
    fn test_update_failure_is_not_fatal() {
        let (mut monitor, counters) = monitor();
        monitor
            .state
            .controller_mut()
            .bus_mut()
            .fail_writes_to(Indicator::Power);
        counters.carry(90.0);
        assert_eq!(monitor.tick().unwrap(), Tick::UpdateFailed);
        assert_eq!(monitor.consecutive_failures(), 0);
        assert_eq!(monitor.state().current_tier(), Tier::Idle);
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown() {
        let (mut monitor, _counters) = monitor();
        let (tx, mut shutdown) = Shutdown::new();
        tx.send(true).unwrap();
        monitor.run(&mut shutdown).await.unwrap();
        assert!(monitor.state().controller().bus().writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_gives_up_after_failures() {
        let (mut monitor, counters) = monitor();
        counters.rx.set(None);
        let (_tx, mut shutdown) = Shutdown::new();
        let err = monitor.run(&mut shutdown).await.unwrap_err();
        assert!(err.to_string().contains("consecutive"));
        assert_eq!(monitor.consecutive_failures(), MAX_CONSECUTIVE_FAILURES);
    }

    #[tokio::test]
    async fn test_shutdown_sleep_wakes_on_trigger() {
        let (tx, mut shutdown) = Shutdown::new();
        let stop = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(true).unwrap();
        };
        let (stopped, ()) = tokio::join!(shutdown.sleep(Duration::from_secs(3600)), stop);
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_test_mode_cycles_all_tiers() {
        let controller = LedController::new(MemoryBus::new(), RecordedDelay::new());
        let mut state = StateManager::new(controller, Thresholds::default(), 255);
        let (tx, mut shutdown) = Shutdown::new();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(
            run_test_mode(&mut state, Duration::from_millis(1), &mut shutdown),
            stop
        );
        result.unwrap();

        let commands = state.controller().bus().commands();
        for color in [Color::GREEN, Color::BLUE, Color::RED] {
            assert!(commands.contains(&(Indicator::NetworkActivity, Command::Color(color))));
        }
        assert!(commands.contains(&(Indicator::StorageSlot2, Command::Color(Color::RED))));
    }

    #[tokio::test]
    async fn test_test_mode_stops_on_failure() {
        let controller = LedController::new(MemoryBus::new(), RecordedDelay::new());
        let mut state = StateManager::new(controller, Thresholds::default(), 255);
        state
            .controller_mut()
            .bus_mut()
            .fail_writes_to(Indicator::NetworkActivity);
        let (_tx, mut shutdown) = Shutdown::new();

        let err = run_test_mode(&mut state, Duration::from_millis(1), &mut shutdown)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("testing mode"));
        assert_eq!(state.current_tier(), Tier::Idle);
    }
}
