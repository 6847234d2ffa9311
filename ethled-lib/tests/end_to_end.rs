//! Usage figures through the classifier down to emulated indicator state

mod common;

use common::*;
use ethled_lib::sampler::{BandwidthSample, CounterSource, Sampler};
use ethled_lib::timing::ManualClock;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const CAPACITY_MBPS: f64 = 1000.0;

/// rx counter that the test advances by a number of bytes per tick.
#[derive(Clone, Default)]
struct SteppedCounters {
    rx: Rc<Cell<u64>>,
}

impl SteppedCounters {
    /// Adds the bytes `percent` of the link carries in one second.
    fn carry(&self, percent: f64) {
        let bytes = (CAPACITY_MBPS * 1_000_000.0 / 8.0 * percent / 100.0) as u64;
        self.rx.set(self.rx.get().wrapping_add(bytes));
    }
}

impl CounterSource for SteppedCounters {
    fn interface_exists(&self, _interface: &str) -> bool {
        true
    }

    fn read_counters(&self, _interface: &str) -> Result<(u64, u64), LedError> {
        Ok((self.rx.get(), 0))
    }
}

fn lit(bus: &MemoryBus, indicator: Indicator) -> Option<Color> {
    let status = bus.status_of(indicator);
    (status.mode == OpMode::On).then_some(status.color)
}

fn panel(bus: &MemoryBus) -> [Option<Color>; 4] {
    Indicator::DRIVEN.map(|indicator| lit(bus, indicator))
}

#[test]
fn test_tiers_on_panel() {
    let clock = ManualClock::new();
    let counters = SteppedCounters::default();
    counters.rx.set(u64::MAX - 1_000);
    let mut sampler = Sampler::with_source("eth0", CAPACITY_MBPS, counters.clone(), clock.clone());
    sampler.initialize().unwrap();

    let mut state = state_manager(255);
    state.force(Tier::Idle).unwrap();

    let white = Some(Color::WHITE);
    let cases = [
        (25.0, Tier::Low, [white, Some(Color::GREEN), None, None]),
        (60.0, Tier::Medium, [white, Some(Color::BLUE), Some(Color::BLUE), None]),
        (90.0, Tier::High, [white, Some(Color::RED), Some(Color::RED), Some(Color::RED)]),
        (5.0, Tier::Idle, [white, None, None, None]),
    ];
    for (percent, tier, expected) in cases {
        counters.carry(percent);
        clock.advance(Duration::from_secs(1));
        let sample = sampler.sample();
        assert!(sample.valid);
        assert!((sample.usage_percent - percent).abs() < 1e-6, "{}", sample);

        assert!(state.update(&sample).unwrap());
        assert_eq!(state.current_tier(), tier);
        assert_eq!(panel(state.controller().bus()), expected, "at {}%", percent);
        assert_eq!(state.controller().bus().status_of(Indicator::Power).brightness, 255);
    }
}

#[test]
fn test_repeated_tier_is_single_sequence() {
    let mut state = state_manager(255);
    state.update(&BandwidthSample::from_usage(60.0)).unwrap();
    let after_first = state.controller().bus().writes().len();
    assert_eq!(after_first, 10);

    state.update(&BandwidthSample::from_usage(61.0)).unwrap();
    assert_eq!(state.controller().bus().writes().len(), after_first);
}

#[test]
fn test_slot1_failure_during_high() {
    let mut state = state_manager(255);
    state.update(&BandwidthSample::from_usage(25.0)).unwrap();
    state.controller_mut().bus_mut().fail_writes_to(Indicator::StorageSlot1);

    let err = state.update(&BandwidthSample::from_usage(90.0)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Protocol);
    assert_eq!(state.current_tier(), Tier::Low);

    // Network already turned red before the abort; Slot2 never touched
    let bus = state.controller().bus();
    assert_eq!(lit(bus, Indicator::NetworkActivity), Some(Color::RED));
    assert_eq!(lit(bus, Indicator::StorageSlot2), None);

    state.controller_mut().bus_mut().clear_failures();
    state.controller_mut().bus_mut().take_writes();
    assert!(state.update(&BandwidthSample::from_usage(90.0)).unwrap());
    assert_eq!(state.current_tier(), Tier::High);

    let registers: Vec<u8> = state.controller().bus().writes().iter().map(|w| w.register).collect();
    assert_eq!(registers, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]);
}

#[test]
fn test_shutdown_after_high() {
    let mut state = state_manager(128);
    state.update(&BandwidthSample::from_usage(95.0)).unwrap();

    let mut controller = state.into_controller();
    controller.turn_off_all().unwrap();
    assert_eq!(panel(controller.bus()), [None; 4]);
}
