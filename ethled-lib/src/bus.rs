//! SMBus transport to the LED controller.
//!
//! [`I2cBus`] talks to the real controller through `/dev/i2c-*`.
//! [`MemoryBus`] emulates the controller in memory: it validates every
//! frame it receives, keeps per-indicator state and serves checksummed
//! status blocks, so the whole pipeline can run without hardware.

use crate::constants::{ADAPTER_NAME_PREFIX, LAST_WRITE_STATUS_REGISTER, STATUS_REGISTER_BASE};
use crate::error::LedError;
use crate::frame::{Command, CommandFrame, Indicator, IndicatorStatus};
use bytes::Bytes;
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zerocopy::IntoBytes;

/// Block-level access to the controller's registers.
pub trait Bus {
    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), LedError>;
    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, LedError>;
    fn read_byte(&mut self, register: u8) -> Result<u8, LedError>;
}

/// Finds the first adapter under `class_root` whose `device/name` starts
/// with the controller's adapter family, returning its entry name
/// (e.g. `i2c-0`).
pub fn find_adapter(class_root: &Path) -> Result<String, LedError> {
    let entries = fs::read_dir(class_root).map_err(|e| {
        warn!("Cannot list {:?}: {}", class_root, e);
        LedError::AdapterNotFound(class_root.to_path_buf())
    })?;

    let mut adapters: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    adapters.sort();

    for adapter in adapters {
        let Ok(name) = fs::read_to_string(adapter.join("device/name")) else {
            continue;
        };
        debug!(adapter = ?adapter, name = name.trim(), "Inspecting I2C adapter");
        if name.starts_with(ADAPTER_NAME_PREFIX) {
            if let Some(entry) = adapter.file_name().and_then(|n| n.to_str()) {
                return Ok(entry.to_string());
            }
        }
    }
    Err(LedError::AdapterNotFound(class_root.to_path_buf()))
}

/// The controller on a Linux i2c-dev character device.
pub struct I2cBus {
    device: LinuxI2CDevice,
    path: PathBuf,
}

impl I2cBus {
    pub fn open(path: impl AsRef<Path>, address: u16) -> Result<Self, LedError> {
        let path = path.as_ref().to_path_buf();
        let device = LinuxI2CDevice::new(&path, address)
            .map_err(|e| LedError::Io(io::Error::other(format!("{}: {}", path.display(), e))))?;
        info!("Opened {} at address {:#04x}", path.display(), address);
        Ok(Self { device, path })
    }

    /// Locates the controller's adapter under `class_root` and opens the
    /// matching device node under `dev_root`.
    pub fn discover(class_root: &Path, dev_root: &Path, address: u16) -> Result<Self, LedError> {
        let adapter = find_adapter(class_root)?;
        info!("Found LED controller adapter {}", adapter);
        Self::open(dev_root.join(adapter), address)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Bus for I2cBus {
    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), LedError> {
        debug!(register, bytes = hex::encode(data), "I2C write");
        self.device
            .smbus_write_i2c_block_data(register, data)
            .map_err(|e| LedError::Bus {
                register,
                message: e.to_string(),
            })
    }

    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, LedError> {
        let data = self
            .device
            .smbus_read_i2c_block_data(register, len)
            .map_err(|e| LedError::Bus {
                register,
                message: e.to_string(),
            })?;
        debug!(register, bytes = hex::encode(&data), "I2C read");
        Ok(data)
    }

    fn read_byte(&mut self, register: u8) -> Result<u8, LedError> {
        self.device.smbus_read_byte_data(register).map_err(|e| LedError::Bus {
            register,
            message: e.to_string(),
        })
    }
}

/// One block write observed by a [`MemoryBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusWrite {
    pub register: u8,
    pub data: Bytes,
}

impl BusWrite {
    /// Decodes the recorded bytes back into the command that was sent.
    pub fn command(&self) -> Result<(Indicator, Command), LedError> {
        let frame = CommandFrame::decode(&self.data)?;
        Ok((frame.indicator()?, Command::from_frame(&frame)?))
    }
}

/// In-memory controller emulation.
#[derive(Debug)]
pub struct MemoryBus {
    writes: Vec<BusWrite>,
    indicators: HashMap<u8, IndicatorStatus>,
    failing: HashSet<u8>,
    raw_blocks: HashMap<u8, Vec<u8>>,
    last_write_ok: bool,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self {
            writes: Vec::new(),
            indicators: HashMap::new(),
            failing: HashSet::new(),
            raw_blocks: HashMap::new(),
            last_write_ok: true,
        }
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> &[BusWrite] {
        &self.writes
    }

    pub fn take_writes(&mut self) -> Vec<BusWrite> {
        std::mem::take(&mut self.writes)
    }

    /// Decoded commands in the order they were written.
    pub fn commands(&self) -> Vec<(Indicator, Command)> {
        self.writes.iter().filter_map(|w| w.command().ok()).collect()
    }

    /// Makes every subsequent write to `indicator` fail with a bus error.
    pub fn fail_writes_to(&mut self, indicator: Indicator) {
        self.failing.insert(indicator.into());
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    /// Serves `data` verbatim for reads of `register`, bypassing emulation.
    pub fn set_raw_block(&mut self, register: u8, data: Vec<u8>) {
        self.raw_blocks.insert(register, data);
    }

    /// Overrides what the last-modification register reports.
    pub fn set_last_write_ok(&mut self, ok: bool) {
        self.last_write_ok = ok;
    }

    /// Emulated state of one indicator.
    pub fn status_of(&self, indicator: Indicator) -> IndicatorStatus {
        self.indicators
            .get(&u8::from(indicator))
            .copied()
            .unwrap_or_default()
    }
}

impl Bus for MemoryBus {
    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<(), LedError> {
        if self.failing.contains(&register) {
            self.last_write_ok = false;
            return Err(LedError::Bus {
                register,
                message: "injected write failure".to_string(),
            });
        }

        debug!(register, bytes = hex::encode(data), "Memory bus write");
        self.writes.push(BusWrite {
            register,
            data: Bytes::copy_from_slice(data),
        });

        let applied = CommandFrame::decode(data).and_then(|frame| {
            if frame.address != register {
                return Err(LedError::InvalidFrame(format!(
                    "frame for indicator {} written to register {:#04x}",
                    frame.address, register
                )));
            }
            Command::from_frame(&frame)
        });
        match applied {
            Ok(command) => {
                self.indicators.entry(register).or_default().apply(&command);
                self.last_write_ok = true;
            }
            Err(e) => {
                warn!("Emulated controller rejected frame: {}", e);
                self.last_write_ok = false;
            }
        }
        Ok(())
    }

    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, LedError> {
        if let Some(raw) = self.raw_blocks.get(&register) {
            return Ok(raw.iter().copied().take(usize::from(len)).collect());
        }
        let id = register
            .checked_sub(STATUS_REGISTER_BASE)
            .and_then(|id| Indicator::try_from(id).ok())
            .ok_or_else(|| LedError::Bus {
                register,
                message: "no such status register".to_string(),
            })?;
        let block = self.status_of(id).to_block();
        Ok(block.as_bytes().iter().copied().take(usize::from(len)).collect())
    }

    fn read_byte(&mut self, register: u8) -> Result<u8, LedError> {
        if register == LAST_WRITE_STATUS_REGISTER {
            return Ok(u8::from(self.last_write_ok));
        }
        Err(LedError::Bus {
            register,
            message: "no such byte register".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Color, OpMode};
    use std::fs;

    fn adapter(root: &Path, entry: &str, name: &str) {
        let dir = root.join(entry).join("device");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), format!("{}\n", name)).unwrap();
    }

    #[test]
    fn test_find_adapter_by_name_prefix() {
        let root = tempfile::tempdir().unwrap();
        adapter(root.path(), "i2c-0", "Synopsys DesignWare I2C adapter");
        adapter(root.path(), "i2c-1", "SMBus I801 adapter at efa0");
        adapter(root.path(), "i2c-2", "i915 gmbus dpb");

        assert_eq!(find_adapter(root.path()).unwrap(), "i2c-1");
    }

    #[test]
    fn test_find_adapter_none_matching() {
        let root = tempfile::tempdir().unwrap();
        adapter(root.path(), "i2c-0", "i915 gmbus dpc");

        let err = find_adapter(root.path()).unwrap_err();
        assert!(matches!(err, LedError::AdapterNotFound(_)));
    }

    #[test]
    fn test_find_adapter_missing_class_dir() {
        let root = tempfile::tempdir().unwrap();
        let err = find_adapter(&root.path().join("absent")).unwrap_err();
        assert!(matches!(err, LedError::AdapterNotFound(_)));
    }

    #[test]
    fn test_memory_bus_emulates_status() {
        let mut bus = MemoryBus::new();
        let frame = CommandFrame::encode(Indicator::StorageSlot1, &Command::Color(Color::BLUE));
        bus.write_block(2, frame.as_bytes()).unwrap();
        let frame = CommandFrame::encode(Indicator::StorageSlot1, &Command::Power(true));
        bus.write_block(2, frame.as_bytes()).unwrap();

        let status = bus.status_of(Indicator::StorageSlot1);
        assert_eq!(status.mode, OpMode::On);
        assert_eq!(status.color, Color::BLUE);
        assert_eq!(bus.read_byte(LAST_WRITE_STATUS_REGISTER).unwrap(), 1);

        let block = bus.read_block(Indicator::StorageSlot1.status_register(), 11).unwrap();
        assert_eq!(block.len(), 11);
    }

    #[test]
    fn test_memory_bus_flags_misaddressed_frame() {
        let mut bus = MemoryBus::new();
        let frame = CommandFrame::encode(Indicator::StorageSlot1, &Command::Power(true));
        bus.write_block(3, frame.as_bytes()).unwrap();
        assert_eq!(bus.read_byte(LAST_WRITE_STATUS_REGISTER).unwrap(), 0);
        assert_eq!(bus.status_of(Indicator::StorageSlot2).mode, OpMode::Off);
    }

    #[test]
    fn test_memory_bus_rejects_checksum_over_address() {
        let mut bus = MemoryBus::new();
        // network power-on, summed with the address byte: 0xa6 instead of 0xa5
        let bad = hex::decode("01a0010000030100000000a6").unwrap();
        bus.write_block(1, &bad).unwrap();
        assert_eq!(bus.read_byte(LAST_WRITE_STATUS_REGISTER).unwrap(), 0);
        assert_eq!(bus.status_of(Indicator::NetworkActivity).mode, OpMode::Off);

        let good = hex::decode("01a0010000030100000000a5").unwrap();
        bus.write_block(1, &good).unwrap();
        assert_eq!(bus.read_byte(LAST_WRITE_STATUS_REGISTER).unwrap(), 1);
        assert_eq!(bus.status_of(Indicator::NetworkActivity).mode, OpMode::On);
    }

    #[test]
    fn test_memory_bus_injected_failure() {
        let mut bus = MemoryBus::new();
        bus.fail_writes_to(Indicator::Power);
        let frame = CommandFrame::encode(Indicator::Power, &Command::Power(true));
        let err = bus.write_block(0, frame.as_bytes()).unwrap_err();
        assert!(matches!(err, LedError::Bus { register: 0, .. }));
        assert!(bus.writes().is_empty());
    }
}
