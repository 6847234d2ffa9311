//! Link bandwidth sampling from cumulative interface byte counters.
//!
//! Counters are read per interface from sysfs
//! (`/sys/class/net/<iface>/statistics/{rx,tx}_bytes`), falling back to the
//! row for the interface in `/proc/net/dev`. Each accepted reading becomes
//! the baseline for the next one.

use crate::constants::{
    MIN_SAMPLE_INTERVAL, NET_CLASS_PATH, NET_DEV_HEADER_LINES, NET_DEV_PATH, NET_DEV_RX_BYTES_FIELD,
    NET_DEV_TX_BYTES_FIELD,
};
use crate::error::LedError;
use crate::timing::{Clock, MonotonicClock};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Cumulative byte counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub captured_at: Instant,
}

/// Why a sample carries no usable measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotInitialized,
    CountersUnavailable,
    IntervalTooShort,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotInitialized => "sampler not initialized",
            SkipReason::CountersUnavailable => "counters unavailable",
            SkipReason::IntervalTooShort => "interval too short",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandwidthSample {
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    pub total_mbps: f64,
    pub usage_percent: f64,
    pub valid: bool,
    pub skip: Option<SkipReason>,
}

impl BandwidthSample {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skip: Some(reason),
            ..Self::default()
        }
    }

    /// A valid sample that only carries a utilization figure.
    pub fn from_usage(usage_percent: f64) -> Self {
        Self {
            usage_percent: usage_percent.clamp(0.0, 100.0),
            valid: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for BandwidthSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.skip {
            Some(reason) => write!(f, "invalid ({})", reason),
            None => write!(
                f,
                "RX: {:.2} Mbps, TX: {:.2} Mbps, Total: {:.2} Mbps, Usage: {:.1}%",
                self.rx_mbps, self.tx_mbps, self.total_mbps, self.usage_percent
            ),
        }
    }
}

/// Where cumulative interface counters come from.
pub trait CounterSource {
    fn interface_exists(&self, interface: &str) -> bool;

    /// Returns `(rx_bytes, tx_bytes)`.
    fn read_counters(&self, interface: &str) -> Result<(u64, u64), LedError>;
}

/// Counters from the Linux sysfs and procfs trees.
#[derive(Debug, Clone)]
pub struct SysCounters {
    class_root: PathBuf,
    net_dev: PathBuf,
}

impl Default for SysCounters {
    fn default() -> Self {
        Self::with_roots(NET_CLASS_PATH, NET_DEV_PATH)
    }
}

impl SysCounters {
    pub fn with_roots(class_root: impl Into<PathBuf>, net_dev: impl Into<PathBuf>) -> Self {
        Self {
            class_root: class_root.into(),
            net_dev: net_dev.into(),
        }
    }

    fn read_statistic(&self, interface: &str, name: &str) -> Option<u64> {
        let path = self.class_root.join(interface).join("statistics").join(name);
        fs::read_to_string(&path).ok()?.trim().parse().ok()
    }

    fn read_sysfs(&self, interface: &str) -> Option<(u64, u64)> {
        Some((
            self.read_statistic(interface, "rx_bytes")?,
            self.read_statistic(interface, "tx_bytes")?,
        ))
    }

    fn read_net_dev(&self, interface: &str) -> Option<(u64, u64)> {
        let contents = fs::read_to_string(&self.net_dev).ok()?;
        parse_net_dev(&contents, interface)
    }
}

impl CounterSource for SysCounters {
    fn interface_exists(&self, interface: &str) -> bool {
        !interface.is_empty() && self.class_root.join(interface).exists()
    }

    fn read_counters(&self, interface: &str) -> Result<(u64, u64), LedError> {
        if let Some(counters) = self.read_sysfs(interface) {
            return Ok(counters);
        }
        trace!("sysfs counters unreadable for {}, trying {:?}", interface, self.net_dev);
        self.read_net_dev(interface)
            .ok_or_else(|| LedError::CountersUnavailable(interface.to_string()))
    }
}

/// Extracts `(rx_bytes, tx_bytes)` for `interface` from the contents of a
/// `/proc/net/dev` style table.
pub fn parse_net_dev(contents: &str, interface: &str) -> Option<(u64, u64)> {
    contents.lines().skip(NET_DEV_HEADER_LINES).find_map(|line| {
        let (name, fields) = line.split_once(':')?;
        if name.trim() != interface {
            return None;
        }
        let fields: Vec<&str> = fields.split_whitespace().collect();
        let rx = fields.get(NET_DEV_RX_BYTES_FIELD)?.parse().ok()?;
        let tx = fields.get(NET_DEV_TX_BYTES_FIELD)?.parse().ok()?;
        Some((rx, tx))
    })
}

/// Bytes transferred between two readings of a 64-bit counter that may have
/// wrapped once.
pub fn counter_delta(previous: u64, current: u64) -> u64 {
    current.wrapping_sub(previous)
}

fn to_mbps(bytes: u64, elapsed: Duration) -> f64 {
    (bytes as f64 * 8.0) / (elapsed.as_secs_f64() * 1_000_000.0)
}

pub struct Sampler<S: CounterSource = SysCounters, C: Clock = MonotonicClock> {
    interface: String,
    capacity_mbps: f64,
    source: S,
    clock: C,
    baseline: Option<CounterSnapshot>,
}

impl Sampler {
    pub fn new(interface: impl Into<String>, capacity_mbps: f64) -> Self {
        Self::with_source(interface, capacity_mbps, SysCounters::default(), MonotonicClock)
    }
}

impl<S: CounterSource, C: Clock> Sampler<S, C> {
    pub fn with_source(interface: impl Into<String>, capacity_mbps: f64, source: S, clock: C) -> Self {
        Self {
            interface: interface.into(),
            capacity_mbps,
            source,
            clock,
            baseline: None,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn capacity_mbps(&self) -> f64 {
        self.capacity_mbps
    }

    /// The last accepted snapshot, if any.
    pub fn baseline(&self) -> Option<CounterSnapshot> {
        self.baseline
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn snapshot(&self) -> Result<CounterSnapshot, LedError> {
        let (rx_bytes, tx_bytes) = self.source.read_counters(&self.interface)?;
        Ok(CounterSnapshot {
            rx_bytes,
            tx_bytes,
            captured_at: self.clock.now(),
        })
    }

    /// Checks that the interface exists and takes the first baseline.
    pub fn initialize(&mut self) -> Result<(), LedError> {
        if !self.source.interface_exists(&self.interface) {
            return Err(LedError::InterfaceNotFound(self.interface.clone()));
        }
        let snapshot = self.snapshot().map_err(|e| {
            warn!("Failed to read initial counters for {}: {}", self.interface, e);
            LedError::CountersUnavailable(self.interface.clone())
        })?;
        self.baseline = Some(snapshot);
        info!(
            "Network monitor initialized for interface {} ({} Mbps)",
            self.interface, self.capacity_mbps
        );
        Ok(())
    }

    /// Measures bandwidth since the baseline.
    ///
    /// Returns an invalid sample, leaving the baseline alone, when the
    /// counters cannot be read or less than [`MIN_SAMPLE_INTERVAL`] has
    /// passed since the baseline was taken.
    pub fn sample(&mut self) -> BandwidthSample {
        let Some(previous) = self.baseline else {
            return BandwidthSample::skipped(SkipReason::NotInitialized);
        };

        let current = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to read network statistics: {}", e);
                return BandwidthSample::skipped(SkipReason::CountersUnavailable);
            }
        };

        let elapsed = current.captured_at.saturating_duration_since(previous.captured_at);
        if elapsed < MIN_SAMPLE_INTERVAL {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Sample interval too short");
            return BandwidthSample::skipped(SkipReason::IntervalTooShort);
        }

        let rx_mbps = to_mbps(counter_delta(previous.rx_bytes, current.rx_bytes), elapsed);
        let tx_mbps = to_mbps(counter_delta(previous.tx_bytes, current.tx_bytes), elapsed);
        let total_mbps = rx_mbps + tx_mbps;
        let usage_percent = (total_mbps / self.capacity_mbps * 100.0).clamp(0.0, 100.0);

        self.baseline = Some(current);
        let sample = BandwidthSample {
            rx_mbps,
            tx_mbps,
            total_mbps,
            usage_percent,
            valid: true,
            skip: None,
        };
        trace!("{}", sample);
        sample
    }
}
