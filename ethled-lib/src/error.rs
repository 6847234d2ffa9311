use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Broad class of a failure, used by the daemon to decide between aborting
/// and carrying on with the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing interface or bus adapter. Fatal at startup.
    Environment,
    /// Counters exist but cannot be read. A tick in the loop is skipped
    /// (see `SkipReason`); during startup the daemon gives up.
    Measurement,
    /// Bus failure or bad read-back. Aborts the current command sequence.
    Protocol,
}

/// The primary error type for the `ethled` library.
#[derive(Error, Debug)]
pub enum LedError {
    #[error("Network interface {0} does not exist")]
    InterfaceNotFound(String),

    #[error("Byte counters for interface {0} are unreadable")]
    CountersUnavailable(String),

    #[error("No compatible I2C adapter found under {0:?}")]
    AdapterNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bus error on register {register:#04x}: {message}")]
    Bus { register: u8, message: String },

    #[error("Checksum mismatch: computed {computed:#06x}, stored {stored:#06x}")]
    Checksum { computed: u16, stored: u16 },

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Controller reports the last modification was not applied")]
    NotAcknowledged,
}

impl LedError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedError::InterfaceNotFound(_) | LedError::AdapterNotFound(_) => ErrorCategory::Environment,
            LedError::CountersUnavailable(_) => ErrorCategory::Measurement,
            LedError::Io(_)
            | LedError::Bus { .. }
            | LedError::Checksum { .. }
            | LedError::InvalidLength { .. }
            | LedError::InvalidFrame(_)
            | LedError::NotAcknowledged => ErrorCategory::Protocol,
        }
    }
}
