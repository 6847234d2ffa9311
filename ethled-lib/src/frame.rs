//! # LED controller wire format
//!
//! Every modification sent to the controller is one fixed 12-byte frame,
//! written as an SMBus block to the register equal to the indicator id:
//!
//! ```text
//! [address][0xa0 0x01][0x00 0x00][opcode][p0 p1 p2 p3][sum hi][sum lo]
//! ```
//!
//! The trailing checksum is the 16-bit sum of the ten preceding bytes with
//! the address slot counted as zero, stored high byte first. Every indicator
//! therefore gets the same checksum for the same command. Status read-backs
//! are 11 bytes and sum their whole body (see [`StatusBlock`]).
//!
//! Enum discriminants in this module are wire values. The indicator id
//! doubles as the write register and as the offset into the status
//! register range, so the numbering must never change.

use crate::constants::{COMMAND_FRAME_SIZE, FRAME_HEADER, STATUS_BLOCK_SIZE};
use crate::error::LedError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::str::FromStr;
use strum_macros::Display;
use zerocopy::byteorder::big_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Addressable indicators on the front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Indicator {
    #[strum(to_string = "power")]
    Power = 0,
    #[strum(to_string = "network")]
    NetworkActivity = 1,
    #[strum(to_string = "slot1")]
    StorageSlot1 = 2,
    #[strum(to_string = "slot2")]
    StorageSlot2 = 3,
    #[strum(to_string = "slot3")]
    StorageSlot3 = 4,
    #[strum(to_string = "slot4")]
    StorageSlot4 = 5,
    #[strum(to_string = "slot5")]
    StorageSlot5 = 6,
    #[strum(to_string = "slot6")]
    StorageSlot6 = 7,
    #[strum(to_string = "slot7")]
    StorageSlot7 = 8,
    #[strum(to_string = "slot8")]
    StorageSlot8 = 9,
}

impl Indicator {
    /// Indicators driven by the utilization classifier, in application order.
    pub const DRIVEN: [Indicator; 4] = [
        Indicator::Power,
        Indicator::NetworkActivity,
        Indicator::StorageSlot1,
        Indicator::StorageSlot2,
    ];

    /// Register the status block of this indicator is read from.
    pub fn status_register(self) -> u8 {
        crate::constants::STATUS_REGISTER_BASE + u8::from(self)
    }
}

impl FromStr for Indicator {
    type Err = LedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let indicator = match s.to_ascii_lowercase().as_str() {
            "power" => Indicator::Power,
            "network" | "netdev" => Indicator::NetworkActivity,
            "slot1" | "disk1" => Indicator::StorageSlot1,
            "slot2" | "disk2" => Indicator::StorageSlot2,
            "slot3" | "disk3" => Indicator::StorageSlot3,
            "slot4" | "disk4" => Indicator::StorageSlot4,
            "slot5" | "disk5" => Indicator::StorageSlot5,
            "slot6" | "disk6" => Indicator::StorageSlot6,
            "slot7" | "disk7" => Indicator::StorageSlot7,
            "slot8" | "disk8" => Indicator::StorageSlot8,
            other => return Err(LedError::InvalidFrame(format!("unknown indicator '{other}'"))),
        };
        Ok(indicator)
    }
}

/// Command opcodes understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Brightness = 0x01,
    Color = 0x02,
    Power = 0x03,
    Blink = 0x04,
    Breath = 0x05,
}

/// Operating mode reported in a status read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OpMode {
    #[default]
    #[strum(to_string = "off")]
    Off = 0,
    #[strum(to_string = "on")]
    On = 1,
    #[strum(to_string = "blink")]
    Blink = 2,
    #[strum(to_string = "breath")]
    Breath = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const OFF: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = LedError;

    /// Accepts a color name (`white`, `green`, `blue`, `red`, `off`) or a
    /// `#rrggbb` / `rrggbb` hex triplet.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" => return Ok(Color::WHITE),
            "green" => return Ok(Color::GREEN),
            "blue" => return Ok(Color::BLUE),
            "red" => return Ok(Color::RED),
            "off" | "black" => return Ok(Color::OFF),
            _ => {}
        }
        let digits = s.trim_start_matches('#');
        let rgb = hex::decode(digits).map_err(|e| LedError::InvalidFrame(format!("bad color '{s}': {e}")))?;
        match rgb.as_slice() {
            [r, g, b] => Ok(Color::new(*r, *g, *b)),
            _ => Err(LedError::InvalidFrame(format!("bad color '{s}': expected 3 bytes"))),
        }
    }
}

/// A single controller command with its typed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Power(bool),
    Color(Color),
    Brightness(u8),
    Blink { on_ms: u16, off_ms: u16 },
    Breath { on_ms: u16, off_ms: u16 },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Power(_) => Opcode::Power,
            Command::Color(_) => Opcode::Color,
            Command::Brightness(_) => Opcode::Brightness,
            Command::Blink { .. } => Opcode::Blink,
            Command::Breath { .. } => Opcode::Breath,
        }
    }

    /// The 4-byte parameter block. Unused trailing bytes are zero.
    pub fn params(&self) -> [u8; 4] {
        match *self {
            Command::Power(on) => [on as u8, 0, 0, 0],
            Command::Color(Color { r, g, b }) => [r, g, b, 0],
            Command::Brightness(level) => [level, 0, 0, 0],
            Command::Blink { on_ms, off_ms } | Command::Breath { on_ms, off_ms } => {
                // The controller takes the full period first, then the on-time.
                let [period_hi, period_lo] = on_ms.wrapping_add(off_ms).to_be_bytes();
                let [on_hi, on_lo] = on_ms.to_be_bytes();
                [period_hi, period_lo, on_hi, on_lo]
            }
        }
    }

    /// Recovers a command from a decoded frame.
    pub fn from_frame(frame: &CommandFrame) -> Result<Self, LedError> {
        let opcode = Opcode::try_from(frame.opcode)
            .map_err(|_| LedError::InvalidFrame(format!("unknown opcode {:#04x}", frame.opcode)))?;
        let p = frame.params;
        let period = u16::from_be_bytes([p[0], p[1]]);
        let on_ms = u16::from_be_bytes([p[2], p[3]]);
        let command = match opcode {
            Opcode::Power => match p[0] {
                0 => Command::Power(false),
                1 => Command::Power(true),
                other => return Err(LedError::InvalidFrame(format!("power state {other} out of range"))),
            },
            Opcode::Color => Command::Color(Color::new(p[0], p[1], p[2])),
            Opcode::Brightness => Command::Brightness(p[0]),
            Opcode::Blink => Command::Blink {
                on_ms,
                off_ms: period.wrapping_sub(on_ms),
            },
            Opcode::Breath => Command::Breath {
                on_ms,
                off_ms: period.wrapping_sub(on_ms),
            },
        };
        Ok(command)
    }
}

/// 16-bit additive checksum over `bytes`.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)))
}

/// Checks a checksummed block: the trailing two bytes must equal the
/// big-endian sum of everything before them, and that sum must be nonzero.
pub fn verify_checksum(block: &[u8]) -> Result<(), LedError> {
    if block.len() < 3 {
        return Err(LedError::InvalidLength {
            expected: 3,
            actual: block.len(),
        });
    }
    let (body, tail) = block.split_at(block.len() - 2);
    let computed = checksum(body);
    let stored = u16::from_be_bytes([tail[0], tail[1]]);
    if computed == 0 || computed != stored {
        return Err(LedError::Checksum { computed, stored });
    }
    Ok(())
}

/// One command frame exactly as it appears on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct CommandFrame {
    pub address: u8,
    pub header: [u8; 2],
    pub reserved: [u8; 2],
    pub opcode: u8,
    pub params: [u8; 4],
    pub checksum: U16,
}

impl CommandFrame {
    pub fn encode(indicator: Indicator, command: &Command) -> Self {
        let mut frame = CommandFrame {
            address: indicator.into(),
            header: FRAME_HEADER,
            reserved: [0; 2],
            opcode: command.opcode().into(),
            params: command.params(),
            checksum: U16::ZERO,
        };
        let sum = checksum(&frame.as_bytes()[1..COMMAND_FRAME_SIZE - 2]);
        frame.checksum = U16::new(sum);
        frame
    }

    /// Parses and validates a frame received or captured as raw bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, LedError> {
        if bytes.len() != COMMAND_FRAME_SIZE {
            return Err(LedError::InvalidLength {
                expected: COMMAND_FRAME_SIZE,
                actual: bytes.len(),
            });
        }
        // the address slot is outside the sum
        let mut body = [0u8; COMMAND_FRAME_SIZE];
        body.copy_from_slice(bytes);
        body[0] = 0;
        verify_checksum(&body)?;
        let frame = CommandFrame::read_from_bytes(bytes)
            .map_err(|_| LedError::InvalidFrame("failed to map frame bytes".to_string()))?;
        if frame.header != FRAME_HEADER {
            return Err(LedError::InvalidFrame(format!(
                "unexpected header {}",
                hex::encode(frame.header)
            )));
        }
        Ok(frame)
    }

    pub fn indicator(&self) -> Result<Indicator, LedError> {
        Indicator::try_from(self.address)
            .map_err(|_| LedError::InvalidFrame(format!("unknown indicator id {}", self.address)))
    }
}

/// Raw per-indicator status block as read back from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct StatusBlock {
    pub mode: u8,
    pub brightness: u8,
    pub color: [u8; 3],
    pub period_ms: U16,
    pub on_ms: U16,
    pub checksum: U16,
}

impl StatusBlock {
    /// Validates length and checksum of a read-back block.
    pub fn parse(bytes: &[u8]) -> Result<Self, LedError> {
        if bytes.len() != STATUS_BLOCK_SIZE {
            return Err(LedError::InvalidLength {
                expected: STATUS_BLOCK_SIZE,
                actual: bytes.len(),
            });
        }
        verify_checksum(bytes)?;
        StatusBlock::read_from_bytes(bytes)
            .map_err(|_| LedError::InvalidFrame("failed to map status bytes".to_string()))
    }

    pub fn decode(&self) -> Result<IndicatorStatus, LedError> {
        let mode = OpMode::try_from(self.mode)
            .map_err(|_| LedError::InvalidFrame(format!("unknown operating mode {}", self.mode)))?;
        let period = self.period_ms.get();
        let on_ms = self.on_ms.get();
        Ok(IndicatorStatus {
            mode,
            brightness: self.brightness,
            color: Color::new(self.color[0], self.color[1], self.color[2]),
            on_ms,
            off_ms: period.wrapping_sub(on_ms),
        })
    }
}

/// Decoded state of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndicatorStatus {
    pub mode: OpMode,
    pub brightness: u8,
    pub color: Color,
    pub on_ms: u16,
    pub off_ms: u16,
}

impl IndicatorStatus {
    /// Applies a command the way the controller does.
    pub fn apply(&mut self, command: &Command) {
        match *command {
            Command::Power(on) => self.mode = if on { OpMode::On } else { OpMode::Off },
            Command::Color(color) => self.color = color,
            Command::Brightness(level) => self.brightness = level,
            Command::Blink { on_ms, off_ms } => {
                self.mode = OpMode::Blink;
                self.on_ms = on_ms;
                self.off_ms = off_ms;
            }
            Command::Breath { on_ms, off_ms } => {
                self.mode = OpMode::Breath;
                self.on_ms = on_ms;
                self.off_ms = off_ms;
            }
        }
    }

    /// Encodes this state as a checksummed status block.
    pub fn to_block(&self) -> StatusBlock {
        let mut block = StatusBlock {
            mode: self.mode.into(),
            brightness: self.brightness,
            color: [self.color.r, self.color.g, self.color.b],
            period_ms: U16::new(self.on_ms.wrapping_add(self.off_ms)),
            on_ms: U16::new(self.on_ms),
            checksum: U16::ZERO,
        };
        let sum = checksum(&block.as_bytes()[..STATUS_BLOCK_SIZE - 2]);
        block.checksum = U16::new(sum);
        block
    }
}

impl fmt::Display for IndicatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode={}, color={}, brightness={}", self.mode, self.color, self.brightness)?;
        if matches!(self.mode, OpMode::Blink | OpMode::Breath) {
            write!(f, ", on={}ms, off={}ms", self.on_ms, self.off_ms)?;
        }
        Ok(())
    }
}
