use ethled_lib::bus::{Bus, MemoryBus};
use ethled_lib::LedError;
use tracing::info;

/// Emulated controller for hosts without the LED hardware. Every frame is
/// validated and logged instead of being sent.
#[derive(Debug, Default)]
pub struct DryRunBus {
    inner: MemoryBus,
}

impl DryRunBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bus for DryRunBus {
    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), LedError> {
        self.inner.write_block(register, data)?;
        for write in self.inner.take_writes() {
            match write.command() {
                Ok((indicator, command)) => info!("[dry-run] {} <- {:?}", indicator, command),
                Err(e) => info!(
                    "[dry-run] register {:#04x} <- {} ({})",
                    write.register,
                    hex::encode(&write.data),
                    e
                ),
            }
        }
        Ok(())
    }

    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, LedError> {
        self.inner.read_block(register, len)
    }

    fn read_byte(&mut self, register: u8) -> Result<u8, LedError> {
        self.inner.read_byte(register)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethled_lib::frame::OpMode;
    use ethled_lib::timing::RecordedDelay;
    use ethled_lib::{Color, Indicator, LedController};

    #[test]
    fn test_dry_run_bus_keeps_state_without_history() {
        let mut led = LedController::new(DryRunBus::new(), RecordedDelay::new());
        led.activate(Indicator::NetworkActivity, Color::GREEN, 10).unwrap();

        assert!(led.bus().inner.writes().is_empty());
        let status = led.read_status(Indicator::NetworkActivity).unwrap().decode().unwrap();
        assert_eq!(status.mode, OpMode::On);
        assert_eq!(status.color, Color::GREEN);
        assert!(led.turn_off_all().is_ok());
    }
}
