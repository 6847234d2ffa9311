//! Utilization tiers and the state manager that puts them on the panel.

use crate::bus::Bus;
use crate::constants::INDICATOR_SETTLE;
use crate::controller::LedController;
use crate::error::LedError;
use crate::frame::{Color, Indicator};
use crate::sampler::BandwidthSample;
use crate::timing::{Delay, ThreadDelay};
use strum_macros::Display;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display)]
pub enum Tier {
    #[default]
    #[strum(to_string = "IDLE")]
    Idle,
    #[strum(to_string = "LOW")]
    Low,
    #[strum(to_string = "MEDIUM")]
    Medium,
    #[strum(to_string = "HIGH")]
    High,
}

/// Indicator states for one tier. Power is not part of the layout; it is
/// always lit white.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLayout {
    pub network: bool,
    pub slot1: bool,
    pub slot2: bool,
    pub color: Color,
}

impl TierLayout {
    /// `(indicator, lit)` for the layout-driven indicators, in application order.
    pub fn indicators(&self) -> [(Indicator, bool); 3] {
        [
            (Indicator::NetworkActivity, self.network),
            (Indicator::StorageSlot1, self.slot1),
            (Indicator::StorageSlot2, self.slot2),
        ]
    }
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Idle, Tier::Low, Tier::Medium, Tier::High];

    pub fn layout(self) -> TierLayout {
        match self {
            Tier::Idle => TierLayout {
                network: false,
                slot1: false,
                slot2: false,
                color: Color::OFF,
            },
            Tier::Low => TierLayout {
                network: true,
                slot1: false,
                slot2: false,
                color: Color::GREEN,
            },
            Tier::Medium => TierLayout {
                network: true,
                slot1: true,
                slot2: false,
                color: Color::BLUE,
            },
            Tier::High => TierLayout {
                network: true,
                slot1: true,
                slot2: true,
                color: Color::RED,
            },
        }
    }
}

/// Utilization percentages at which the Low, Medium and High tiers start.
///
/// Ordering between the three is not enforced; classification is a plain
/// chain of strict comparisons in the order low, medium, high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 10.0,
            medium: 40.0,
            high: 80.0,
        }
    }
}

/// Maps a utilization percentage to a tier. A value equal to a threshold
/// falls into the higher tier.
pub fn classify(usage_percent: f64, thresholds: &Thresholds) -> Tier {
    if usage_percent < thresholds.low {
        Tier::Idle
    } else if usage_percent < thresholds.medium {
        Tier::Low
    } else if usage_percent < thresholds.high {
        Tier::Medium
    } else {
        Tier::High
    }
}

/// Tracks the tier currently on the panel and rewrites the indicators only
/// when the classification changes.
///
/// The recorded tier advances only after every write of the new layout
/// succeeded, so a layout that failed part-way is reapplied in full the next
/// time the same tier is computed.
pub struct StateManager<B: Bus, D: Delay = ThreadDelay> {
    controller: LedController<B, D>,
    current: Tier,
    thresholds: Thresholds,
    brightness: u8,
}

impl<B: Bus, D: Delay> StateManager<B, D> {
    pub fn new(controller: LedController<B, D>, thresholds: Thresholds, brightness: u8) -> Self {
        Self {
            controller,
            current: Tier::Idle,
            thresholds,
            brightness,
        }
    }

    pub fn current_tier(&self) -> Tier {
        self.current
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn controller(&self) -> &LedController<B, D> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut LedController<B, D> {
        &mut self.controller
    }

    pub fn into_controller(self) -> LedController<B, D> {
        self.controller
    }

    /// Classifies `sample` and applies the resulting tier if it differs
    /// from the current one. Returns whether the panel changed.
    pub fn update(&mut self, sample: &BandwidthSample) -> Result<bool, LedError> {
        if !sample.valid {
            return Ok(false);
        }

        let tier = classify(sample.usage_percent, &self.thresholds);
        if tier == self.current {
            return Ok(false);
        }

        info!(
            "Bandwidth: {:.2} Mbps ({:.1}%), changing LED state: {} -> {}",
            sample.total_mbps, sample.usage_percent, self.current, tier
        );
        self.apply_layout(tier)?;
        self.current = tier;
        Ok(true)
    }

    /// Applies `tier` unconditionally, committing it on success.
    pub fn force(&mut self, tier: Tier) -> Result<(), LedError> {
        info!("Setting LED state to {}", tier);
        self.apply_layout(tier)?;
        self.current = tier;
        Ok(())
    }

    fn apply_layout(&mut self, tier: Tier) -> Result<(), LedError> {
        let layout = tier.layout();
        let brightness = self.brightness;

        self.controller
            .activate(Indicator::Power, Color::WHITE, brightness)
            .inspect_err(|e| error!("Failed to light power LED for {}: {}", tier, e))?;
        self.controller.settle(INDICATOR_SETTLE);

        for (indicator, lit) in layout.indicators() {
            let result = if lit {
                self.controller.activate(indicator, layout.color, brightness)
            } else {
                self.controller.deactivate(indicator)
            };
            result.inspect_err(|e| error!("Failed to apply {} on {} LED: {}", tier, indicator, e))?;
            self.controller.settle(INDICATOR_SETTLE);
        }

        debug!("Applied {} layout", tier);
        Ok(())
    }
}
