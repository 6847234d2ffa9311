//! Common test utilities and shared imports

// Shared across several test files; not every item is used in each
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use ethled_lib::bus::{Bus, BusWrite, MemoryBus};
#[allow(unused_imports)]
pub use ethled_lib::controller::LedController;
#[allow(unused_imports)]
pub use ethled_lib::error::{ErrorCategory, LedError};
#[allow(unused_imports)]
pub use ethled_lib::frame::{Color, Command, CommandFrame, Indicator, OpMode, StatusBlock};
#[allow(unused_imports)]
pub use ethled_lib::state::{StateManager, Thresholds, Tier};
#[allow(unused_imports)]
pub use ethled_lib::timing::RecordedDelay;
#[allow(unused_imports)]
pub use hex;

use std::fs;
use std::path::Path;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Color, brightness and power frames that light the network LED green at
/// full brightness.
#[allow(dead_code)]
pub const NETWORK_GREEN_SEQUENCE: [&str; 3] = [
    "01a001000002 00ff0000 01a2",
    "01a001000001 ff000000 01a1",
    "01a001000003 01000000 00a5",
];

/// Status read-back of a power LED that is on, white, brightness 255.
#[allow(dead_code)]
pub const POWER_WHITE_STATUS: &str = "01ffffffff00000000 03fd";

/// Strips the grouping spaces used in the fixtures above.
#[allow(dead_code)]
pub fn fixture(hex_data: &str) -> Bytes {
    hex_to_bytes(&hex_data.replace(' ', ""))
}

#[allow(dead_code)]
pub fn state_manager(brightness: u8) -> StateManager<MemoryBus, RecordedDelay> {
    let controller = LedController::new(MemoryBus::new(), RecordedDelay::new());
    StateManager::new(controller, Thresholds::default(), brightness)
}

/// Writes `statistics/{rx,tx}_bytes` for `iface` under a fake net class root.
#[allow(dead_code)]
pub fn write_sysfs_counters(class_root: &Path, iface: &str, rx: u64, tx: u64) {
    let stats = class_root.join(iface).join("statistics");
    fs::create_dir_all(&stats).unwrap();
    fs::write(stats.join("rx_bytes"), format!("{}\n", rx)).unwrap();
    fs::write(stats.join("tx_bytes"), format!("{}\n", tx)).unwrap();
}

/// Writes a `/proc/net/dev` style table with one row per `(iface, rx, tx)`.
#[allow(dead_code)]
pub fn write_net_dev(path: &Path, rows: &[(&str, u64, u64)]) {
    let mut table = String::from(
        "Inter-|   Receive                                                |  Transmit\n \
         face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n",
    );
    for (iface, rx, tx) in rows {
        table.push_str(&format!(
            "{:>6}: {} 0 0 0 0 0 0 0 {} 0 0 0 0 0 0 0\n",
            iface, rx, tx
        ));
    }
    fs::write(path, table).unwrap();
}
