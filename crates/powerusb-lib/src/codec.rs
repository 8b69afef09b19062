//! Command codec: command framing and response decoding.
//!
//! A [`Command`] is one or two bytes (opcode plus optional value). On the wire
//! it is always sent as a 64-byte frame padded with `0xFF`. Responses are up
//! to 64 bytes, of which only the first 1–4 carry meaning.

use std::fmt;

use serde::Serialize;

use crate::protocol::*;
use crate::socket::{PowerState, SocketIndex};

// ── Error type ──

/// Response decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The device returned fewer bytes than the operation needs.
    ShortRead {
        op: &'static str,
        needed: usize,
        got: usize,
    },
    /// Model byte outside 1..=4.
    UnknownModel(u8),
    /// Socket state byte outside {0, 1}.
    InvalidPowerState(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::ShortRead { op, needed, got } => {
                write!(f, "{op}: short response ({got} bytes, need {needed})")
            }
            DecodeError::UnknownModel(b) => write!(f, "unknown model byte 0x{b:02X}"),
            DecodeError::InvalidPowerState(b) => {
                write!(f, "invalid power state byte 0x{b:02X} (expected 0 or 1)")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

pub type Result<T> = std::result::Result<T, DecodeError>;

// ── Commands ──

/// A single protocol command: opcode plus an optional value byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    bytes: [u8; 2],
    len: usize,
}

impl Command {
    const fn op(name: &'static str, code: u8) -> Self {
        Command {
            name,
            bytes: [code, 0],
            len: 1,
        }
    }

    const fn with_value(name: &'static str, code: u8, value: u8) -> Self {
        Command {
            name,
            bytes: [code, value],
            len: 2,
        }
    }

    /// Human-readable operation name, used in logs and error context.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Opcode byte.
    pub fn code(&self) -> u8 {
        self.bytes[0]
    }

    /// Unpadded command bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The padded 64-byte frame written to the device.
    pub fn frame(&self) -> [u8; FRAME_LEN] {
        let mut out = [FRAME_PAD; FRAME_LEN];
        out[..self.len].copy_from_slice(self.bytes());
        out
    }
}

pub const READ_MODEL: Command = Command::op("read model", CMD_READ_MODEL);
pub const READ_FIRMWARE_VERSION: Command =
    Command::op("read firmware version", CMD_READ_FIRMWARE_VER);
pub const READ_CURRENT: Command = Command::op("read current", CMD_READ_CURRENT);
pub const READ_CUMULATIVE: Command = Command::op("read cumulative current", CMD_READ_CURRENT_CUM);
pub const RESET_COUNTER: Command =
    Command::op("reset cumulative counter", CMD_RESET_CURRENT_COUNT);
pub const READ_OVERLOAD: Command = Command::op("read overload", CMD_READ_OVERLOAD);
pub const ALL_ON: Command = Command::op("all sockets on", CMD_ALL_PORT_ON);
pub const ALL_OFF: Command = Command::op("all sockets off", CMD_ALL_PORT_OFF);
pub const RESET_BOARD: Command = Command::op("reset board", CMD_RESET_BOARD);
pub const READ_MODE: Command = Command::op("read mode", CMD_READ_MODE);
pub const SET_CURRENT_OFFSET: Command = Command::op("set current offset", CMD_SET_CURRENT_OFFSET);

pub fn write_overload(value: u8) -> Command {
    Command::with_value("write overload", CMD_WRITE_OVERLOAD, value)
}

pub fn set_mode(value: u8) -> Command {
    Command::with_value("set mode", CMD_SET_MODE, value)
}

pub fn set_current_ratio(value: u8) -> Command {
    Command::with_value("set current ratio", CMD_SET_CURRENT_RATIO, value)
}

/// Switch a socket's live power.
pub fn set_socket_power(index: SocketIndex, state: PowerState) -> Command {
    let i = index.offset();
    match state {
        PowerState::On => Command::op("socket on", CMD_SOCKET_ON[i]),
        PowerState::Off => Command::op("socket off", CMD_SOCKET_OFF[i]),
    }
}

/// Set a socket's power-up default.
pub fn set_socket_default(index: SocketIndex, state: PowerState) -> Command {
    let i = index.offset();
    match state {
        PowerState::On => Command::op("socket default on", CMD_SOCKET_DEFAULT_ON[i]),
        PowerState::Off => Command::op("socket default off", CMD_SOCKET_DEFAULT_OFF[i]),
    }
}

pub fn read_socket_power(index: SocketIndex) -> Command {
    Command::op("read socket state", CMD_SOCKET_STATE[index.offset()])
}

pub fn read_socket_default(index: SocketIndex) -> Command {
    Command::op(
        "read socket default",
        CMD_SOCKET_DEFAULT_STATE[index.offset()],
    )
}

// ── Decoded values ──

/// Strip model reported by firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Model {
    Basic,
    DigitalIO,
    ComputerWatchdog,
    SmartPro,
}

impl Model {
    /// Map the firmware's model byte (1-based) to a model.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Model::Basic),
            2 => Some(Model::DigitalIO),
            3 => Some(Model::ComputerWatchdog),
            4 => Some(Model::SmartPro),
            _ => None,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Model::Basic => "Basic",
            Model::DigitalIO => "Digital IO",
            Model::ComputerWatchdog => "Computer Watchdog",
            Model::SmartPro => "Smart Pro",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ── Decoders ──

fn require(op: &'static str, resp: &[u8], needed: usize) -> Result<()> {
    if resp.len() < needed {
        return Err(DecodeError::ShortRead {
            op,
            needed,
            got: resp.len(),
        });
    }
    Ok(())
}

pub fn decode_model(resp: &[u8]) -> Result<Model> {
    require(READ_MODEL.name(), resp, 1)?;
    Model::from_byte(resp[0]).ok_or(DecodeError::UnknownModel(resp[0]))
}

pub fn decode_firmware_version(resp: &[u8]) -> Result<FirmwareVersion> {
    require(READ_FIRMWARE_VERSION.name(), resp, 2)?;
    Ok(FirmwareVersion {
        major: resp[0],
        minor: resp[1],
    })
}

/// Instantaneous current in mA. A short reply reads as zero: the firmware
/// returns nothing while the meter is momentarily unavailable.
pub fn decode_current(resp: &[u8]) -> u16 {
    match resp {
        [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
        _ => 0,
    }
}

/// Cumulative mA·min counter. A short reply reads as zero.
pub fn decode_cumulative(resp: &[u8]) -> u32 {
    match resp {
        [a, b, c, d, ..] => u32::from_be_bytes([*a, *b, *c, *d]),
        _ => 0,
    }
}

/// Single-byte value (overload threshold, operating mode).
pub fn decode_byte(op: &'static str, resp: &[u8]) -> Result<u8> {
    require(op, resp, 1)?;
    Ok(resp[0])
}

pub fn decode_power_state(op: &'static str, resp: &[u8]) -> Result<PowerState> {
    require(op, resp, 1)?;
    match resp[0] {
        0 => Ok(PowerState::Off),
        1 => Ok(PowerState::On),
        b => Err(DecodeError::InvalidPowerState(b)),
    }
}

/// Convert the raw cumulative counter (mA·min) to kWh at 120 V.
///
/// mA·min / 1000 / 60 * 120 / 1000 reduces to a single division by
/// 500000; it must stay a single division to match bit-for-bit.
pub fn kwh_from_raw(raw: u32) -> f64 {
    raw as f64 / RAW_PER_KWH
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: u8) -> SocketIndex {
        SocketIndex::new(n).unwrap()
    }

    // ── Framing ──

    #[test]
    fn command_frame_is_padded_with_ff() {
        let f = READ_MODEL.frame();
        assert_eq!(f.len(), 64);
        assert_eq!(f[0], 0xAA);
        assert!(f[1..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn valued_command_frame_keeps_value_byte() {
        let f = write_overload(0x10).frame();
        assert_eq!(&f[..2], &[0xB4, 0x10]);
        assert_eq!(f[2..].len(), 62);
        assert!(f[2..].iter().all(|&b| b == 0xFF));
    }

    // ── Socket command tables ──

    #[test]
    fn socket_on_off_bytes() {
        let on: Vec<u8> = (1..=3)
            .map(|n| set_socket_power(idx(n), PowerState::On).code())
            .collect();
        let off: Vec<u8> = (1..=3)
            .map(|n| set_socket_power(idx(n), PowerState::Off).code())
            .collect();
        assert_eq!(on, b"ACE");
        assert_eq!(off, b"BDP");
    }

    #[test]
    fn socket_default_bytes() {
        let on: Vec<u8> = (1..=3)
            .map(|n| set_socket_default(idx(n), PowerState::On).code())
            .collect();
        let off: Vec<u8> = (1..=3)
            .map(|n| set_socket_default(idx(n), PowerState::Off).code())
            .collect();
        assert_eq!(on, b"NGO");
        assert_eq!(off, b"FQH");
    }

    #[test]
    fn socket_set_commands_are_single_byte() {
        for n in 1..=3 {
            for state in [PowerState::On, PowerState::Off] {
                assert_eq!(set_socket_power(idx(n), state).bytes().len(), 1);
                assert_eq!(set_socket_default(idx(n), state).bytes().len(), 1);
            }
        }
    }

    #[test]
    fn live_off_and_default_off_differ() {
        for n in 1..=3 {
            assert_ne!(
                set_socket_power(idx(n), PowerState::Off),
                set_socket_default(idx(n), PowerState::Off)
            );
        }
    }

    #[test]
    fn socket_read_bytes() {
        let live: Vec<u8> = (1..=3).map(|n| read_socket_power(idx(n)).code()).collect();
        let def: Vec<u8> = (1..=3)
            .map(|n| read_socket_default(idx(n)).code())
            .collect();
        assert_eq!(live, [0xA1, 0xA2, 0xAC]);
        assert_eq!(def, [0xA3, 0xA4, 0xAD]);
    }

    // ── Strip commands ──

    #[test]
    fn strip_command_codes() {
        assert_eq!(READ_MODEL.code(), 0xAA);
        assert_eq!(READ_FIRMWARE_VERSION.code(), 0xA7);
        assert_eq!(READ_CURRENT.code(), 0xB1);
        assert_eq!(READ_CUMULATIVE.code(), 0xB2);
        assert_eq!(RESET_COUNTER.code(), 0xB3);
        assert_eq!(READ_OVERLOAD.code(), 0xB5);
        assert_eq!(ALL_ON.code(), 0xA5);
        assert_eq!(ALL_OFF.code(), 0xA6);
        assert_eq!(RESET_BOARD.code(), 0xC1);
        assert_eq!(READ_MODE.code(), 0xA9);
        assert_eq!(SET_CURRENT_OFFSET.code(), 0xC2);
        assert_eq!(set_mode(2).bytes(), &[0xA8, 2]);
        assert_eq!(set_current_ratio(7).bytes(), &[0xB6, 7]);
    }

    // ── Model ──

    #[test]
    fn decode_model_known_values() {
        assert_eq!(decode_model(&[1, 0xFF]), Ok(Model::Basic));
        assert_eq!(decode_model(&[2]), Ok(Model::DigitalIO));
        assert_eq!(decode_model(&[3]), Ok(Model::ComputerWatchdog));
        assert_eq!(decode_model(&[4, 9, 9]), Ok(Model::SmartPro));
    }

    #[test]
    fn decode_model_rejects_zero_and_out_of_range() {
        assert_eq!(decode_model(&[0]), Err(DecodeError::UnknownModel(0)));
        assert_eq!(decode_model(&[5]), Err(DecodeError::UnknownModel(5)));
        assert_eq!(decode_model(&[0xFF]), Err(DecodeError::UnknownModel(0xFF)));
    }

    #[test]
    fn decode_model_empty_is_short_read() {
        assert!(matches!(
            decode_model(&[]),
            Err(DecodeError::ShortRead { needed: 1, got: 0, .. })
        ));
    }

    #[test]
    fn model_display_names() {
        assert_eq!(Model::Basic.to_string(), "Basic");
        assert_eq!(Model::ComputerWatchdog.to_string(), "Computer Watchdog");
    }

    // ── Firmware ──

    #[test]
    fn decode_firmware_version_formats() {
        assert_eq!(decode_firmware_version(&[3, 1, 0xAA]).unwrap().to_string(), "3.1");
        assert_eq!(decode_firmware_version(&[0, 0]).unwrap().to_string(), "0.0");
    }

    #[test]
    fn decode_firmware_version_short_read() {
        let err = decode_firmware_version(&[3]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortRead {
                op: "read firmware version",
                needed: 2,
                got: 1
            }
        );
    }

    // ── Current ──

    #[test]
    fn decode_current_big_endian() {
        assert_eq!(decode_current(&[0x01, 0x2C, 0xFF]), 300);
        assert_eq!(decode_current(&[0xFF, 0xFF]), 65535);
    }

    #[test]
    fn decode_current_short_reads_are_zero() {
        for _ in 0..3 {
            assert_eq!(decode_current(&[]), 0);
        }
        assert_eq!(decode_current(&[0x05]), 0);
    }

    #[test]
    fn decode_cumulative_big_endian() {
        assert_eq!(decode_cumulative(&[0x00, 0x12, 0xD6, 0x87]), 1_234_567);
        assert_eq!(decode_cumulative(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00]), u32::MAX);
    }

    #[test]
    fn decode_cumulative_short_reads_are_zero() {
        assert_eq!(decode_cumulative(&[]), 0);
        assert_eq!(decode_cumulative(&[1, 2, 3]), 0);
    }

    // ── kWh ──

    #[test]
    fn kwh_exact_values() {
        assert_eq!(kwh_from_raw(500_000), 1.0);
        assert_eq!(kwh_from_raw(0), 0.0);
        assert_eq!(kwh_from_raw(1_234_567), 2.469134);
    }

    #[test]
    fn kwh_matches_direct_division_across_range() {
        for raw in [1u32, 7, 499_999, 1_000_001, 0x8000_0000, u32::MAX] {
            assert_eq!(kwh_from_raw(raw).to_bits(), (raw as f64 / 500000.0).to_bits());
        }
    }

    // ── Power state / byte ──

    #[test]
    fn decode_power_state_values() {
        assert_eq!(decode_power_state("x", &[0]), Ok(PowerState::Off));
        assert_eq!(decode_power_state("x", &[1, 0xFF]), Ok(PowerState::On));
        assert_eq!(
            decode_power_state("x", &[2]),
            Err(DecodeError::InvalidPowerState(2))
        );
    }

    #[test]
    fn decode_power_state_empty_is_error() {
        assert!(decode_power_state("read socket state", &[]).is_err());
    }

    #[test]
    fn decode_byte_reads_first() {
        assert_eq!(decode_byte("read overload", &[15, 1, 2]), Ok(15));
        assert!(decode_byte("read overload", &[]).is_err());
    }

    #[test]
    fn decode_error_display() {
        let e = DecodeError::ShortRead {
            op: "read model",
            needed: 1,
            got: 0,
        };
        assert_eq!(e.to_string(), "read model: short response (0 bytes, need 1)");
        assert_eq!(
            DecodeError::UnknownModel(7).to_string(),
            "unknown model byte 0x07"
        );
    }
}
