// Protocol and platform constants for the NAS LED controller

use std::time::Duration;

/// 7-bit SMBus address of the LED controller
pub const DEVICE_ADDRESS: u16 = 0x3a;

/// Name prefix of the adapter the controller hangs off
pub const ADAPTER_NAME_PREFIX: &str = "SMBus I801 adapter";

/// Sysfs class directory listing i2c-dev adapters
pub const I2C_DEV_CLASS_PATH: &str = "/sys/class/i2c-dev";

/// Directory holding the i2c-dev character devices
pub const DEV_PATH: &str = "/dev";

/// Size of a command frame (12 bytes)
pub const COMMAND_FRAME_SIZE: usize = 12;

/// Size of a per-indicator status read-back block (11 bytes)
pub const STATUS_BLOCK_SIZE: usize = 11;

/// Fixed header bytes following the address byte
pub const FRAME_HEADER: [u8; 2] = [0xa0, 0x01];

/// Register holding the result of the last modification (1 = applied)
pub const LAST_WRITE_STATUS_REGISTER: u8 = 0x80;

/// Base register for per-indicator status blocks (base + indicator id)
pub const STATUS_REGISTER_BASE: u8 = 0x81;

/// Wait between the color, brightness and power steps of an activation
pub const ACTIVATE_SETTLE: Duration = Duration::from_millis(10);

/// Wait after each indicator while applying a tier layout
pub const INDICATOR_SETTLE: Duration = Duration::from_millis(100);

/// Wait between indicators while switching everything off
pub const SHUTDOWN_SETTLE: Duration = Duration::from_millis(20);

/// Wait before reading back the last-modification register after shutdown
pub const VERIFY_SETTLE: Duration = Duration::from_millis(50);

/// Sysfs class directory for network interfaces
pub const NET_CLASS_PATH: &str = "/sys/class/net";

/// Global per-interface counters table
pub const NET_DEV_PATH: &str = "/proc/net/dev";

/// Header lines at the top of the counters table
pub const NET_DEV_HEADER_LINES: usize = 2;

/// Zero-based numeric field holding received bytes in a counters table row
pub const NET_DEV_RX_BYTES_FIELD: usize = 0;

/// Zero-based numeric field holding transmitted bytes in a counters table row
pub const NET_DEV_TX_BYTES_FIELD: usize = 8;

/// Shortest interval that yields a meaningful bandwidth figure
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
