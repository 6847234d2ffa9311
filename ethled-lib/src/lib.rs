pub mod bus;
pub mod constants;
pub mod controller;
pub mod error;
pub mod frame;
pub mod sampler;
pub mod state;
pub mod timing;

// Re-export the types a daemon needs to wire everything together
pub use bus::{Bus, I2cBus, MemoryBus};
pub use controller::LedController;
pub use error::{ErrorCategory, LedError};
pub use frame::{Color, Command, Indicator, IndicatorStatus};
pub use sampler::{BandwidthSample, Sampler, SkipReason};
pub use state::{StateManager, Thresholds, Tier};
