use crate::bus::{Bus, I2cBus};
use crate::constants::{
    ACTIVATE_SETTLE, DEV_PATH, DEVICE_ADDRESS, I2C_DEV_CLASS_PATH, LAST_WRITE_STATUS_REGISTER, SHUTDOWN_SETTLE,
    STATUS_BLOCK_SIZE, VERIFY_SETTLE,
};
use crate::error::LedError;
use crate::frame::{Color, Command, CommandFrame, Indicator, StatusBlock};
use crate::timing::{Delay, ThreadDelay};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zerocopy::IntoBytes;

/// Exclusive handle on the LED controller.
///
/// Every operation reports bus failures to the caller. Nothing here retries.
pub struct LedController<B: Bus, D: Delay = ThreadDelay> {
    bus: B,
    delay: D,
}

impl LedController<I2cBus, ThreadDelay> {
    /// Finds the controller's SMBus adapter and claims it.
    pub fn bind() -> Result<Self, LedError> {
        info!("Searching for LED controller...");
        let bus = I2cBus::discover(Path::new(I2C_DEV_CLASS_PATH), Path::new(DEV_PATH), DEVICE_ADDRESS)?;
        info!("LED controller initialized on {}", bus.path().display());
        Ok(Self::new(bus, ThreadDelay))
    }
}

impl<B: Bus, D: Delay> LedController<B, D> {
    pub fn new(bus: B, delay: D) -> Self {
        Self { bus, delay }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Waits for the controller to apply the previous command.
    pub fn settle(&mut self, duration: Duration) {
        self.delay.delay(duration);
    }

    pub fn encode(indicator: Indicator, command: &Command) -> CommandFrame {
        CommandFrame::encode(indicator, command)
    }

    pub fn write(&mut self, indicator: Indicator, command: Command) -> Result<(), LedError> {
        let frame = Self::encode(indicator, &command);
        debug!(%indicator, ?command, "Sending command");
        self.bus.write_block(indicator.into(), frame.as_bytes())
    }

    /// Reads the checksummed status block of `indicator`.
    pub fn read_status(&mut self, indicator: Indicator) -> Result<StatusBlock, LedError> {
        let raw = self
            .bus
            .read_block(indicator.status_register(), STATUS_BLOCK_SIZE as u8)?;
        StatusBlock::parse(&raw)
    }

    pub fn set_power(&mut self, indicator: Indicator, on: bool) -> Result<(), LedError> {
        self.write(indicator, Command::Power(on))
    }

    pub fn set_color(&mut self, indicator: Indicator, color: Color) -> Result<(), LedError> {
        self.write(indicator, Command::Color(color))
    }

    pub fn set_brightness(&mut self, indicator: Indicator, level: u8) -> Result<(), LedError> {
        self.write(indicator, Command::Brightness(level))
    }

    pub fn set_blink(&mut self, indicator: Indicator, on_ms: u16, off_ms: u16) -> Result<(), LedError> {
        self.write(indicator, Command::Blink { on_ms, off_ms })
    }

    pub fn set_breath(&mut self, indicator: Indicator, on_ms: u16, off_ms: u16) -> Result<(), LedError> {
        self.write(indicator, Command::Breath { on_ms, off_ms })
    }

    /// Color, then brightness, then power on, with a settle delay between
    /// steps. A failing step aborts the rest; earlier steps stay applied.
    pub fn activate(&mut self, indicator: Indicator, color: Color, brightness: u8) -> Result<(), LedError> {
        self.set_color(indicator, color).inspect_err(|e| {
            error!("Failed to set color for {} LED: {}", indicator, e);
        })?;
        self.settle(ACTIVATE_SETTLE);

        self.set_brightness(indicator, brightness).inspect_err(|e| {
            error!("Failed to set brightness for {} LED: {}", indicator, e);
        })?;
        self.settle(ACTIVATE_SETTLE);

        self.set_power(indicator, true).inspect_err(|e| {
            error!("Failed to turn on {} LED: {}", indicator, e);
        })
    }

    pub fn deactivate(&mut self, indicator: Indicator) -> Result<(), LedError> {
        self.set_power(indicator, false)
    }

    /// Best-effort check of the controller's last-modification register.
    /// Any read failure counts as "not applied".
    pub fn verify_last_write_ok(&mut self) -> bool {
        match self.bus.read_byte(LAST_WRITE_STATUS_REGISTER) {
            Ok(value) => value == 1,
            Err(e) => {
                warn!("Cannot read last-modification register: {}", e);
                false
            }
        }
    }

    /// Switches off every classifier-driven indicator, power included.
    ///
    /// Keeps going past individual failures and returns the first one. When
    /// every write went through, the controller is asked whether the last
    /// modification was applied.
    pub fn turn_off_all(&mut self) -> Result<(), LedError> {
        let mut first_error = None;
        for (i, indicator) in Indicator::DRIVEN.into_iter().enumerate() {
            if i > 0 {
                self.settle(SHUTDOWN_SETTLE);
            }
            if let Err(e) = self.deactivate(indicator) {
                error!("Failed to turn off {} LED: {}", indicator, e);
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.settle(VERIFY_SETTLE);
        if !self.verify_last_write_ok() {
            warn!("LED controller reports last modification was not successful");
            return Err(LedError::NotAcknowledged);
        }
        Ok(())
    }
}
