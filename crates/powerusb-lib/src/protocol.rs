//! Protocol constants for PowerUSB switched power strips.
//!
//! The strip is a Microchip PIC HID device. Every command is a short byte
//! sequence padded with `0xFF` to a 64-byte interrupt frame; replies are read
//! back from the interrupt IN endpoint after a fixed settle delay.
//!
//! ## Model coverage
//!
//! Only the Basic strip commands are exercised. The Digital IO, Computer
//! Watchdog and Smart command codes are listed so the full command space is
//! documented in one place, but nothing in this crate sends them.

use std::time::Duration;

// ── USB identifiers ──

/// Microchip vendor ID used by PowerUSB strips.
pub const POWERUSB_VID: u16 = 0x04d8;

/// PowerUSB product ID.
pub const POWERUSB_PID: u16 = 0x003f;

/// `bDeviceClass` meaning "class is defined per interface".
pub const USB_CLASS_PER_INTERFACE: u8 = 0x00;

/// `bInterfaceClass` for HID.
pub const USB_CLASS_HID: u8 = 0x03;

/// Default interrupt OUT endpoint when the descriptor cannot be walked.
pub const DEFAULT_ENDPOINT_OUT: u8 = 0x01;

/// Default interrupt IN endpoint when the descriptor cannot be walked.
pub const DEFAULT_ENDPOINT_IN: u8 = 0x81;

// ── Framing ──

/// Size of every write frame and the maximum size of every read.
pub const FRAME_LEN: usize = 64;

/// Padding byte appended after the command bytes.
pub const FRAME_PAD: u8 = 0xFF;

/// Minimum wait between a write and the matching read.
///
/// Firmware turnaround time. Configurable upward, never below this.
pub const SETTLE_DELAY: Duration = Duration::from_millis(20);

/// Default timeout for a single interrupt read.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Assumed mains voltage for the cumulative kWh conversion is 120 V, which
/// collapses mA·min → kWh to a single division by this constant.
pub const RAW_PER_KWH: f64 = 500_000.0;

// ── Strip commands (Basic) ──

pub const CMD_READ_FIRMWARE_VER: u8 = 0xA7;
pub const CMD_READ_MODEL: u8 = 0xAA;

pub const CMD_READ_CURRENT: u8 = 0xB1;
pub const CMD_READ_CURRENT_CUM: u8 = 0xB2;
pub const CMD_RESET_CURRENT_COUNT: u8 = 0xB3;
pub const CMD_WRITE_OVERLOAD: u8 = 0xB4;
pub const CMD_READ_OVERLOAD: u8 = 0xB5;
pub const CMD_SET_CURRENT_RATIO: u8 = 0xB6;
pub const CMD_RESET_BOARD: u8 = 0xC1;
pub const CMD_SET_CURRENT_OFFSET: u8 = 0xC2;

pub const CMD_ALL_PORT_ON: u8 = 0xA5;
pub const CMD_ALL_PORT_OFF: u8 = 0xA6;
pub const CMD_SET_MODE: u8 = 0xA8;
pub const CMD_READ_MODE: u8 = 0xA9;

// ── Socket commands, indexed by socket number - 1 ──

pub const CMD_SOCKET_ON: [u8; 3] = [b'A', b'C', b'E'];
pub const CMD_SOCKET_OFF: [u8; 3] = [b'B', b'D', b'P'];
pub const CMD_SOCKET_DEFAULT_ON: [u8; 3] = [b'N', b'G', b'O'];
pub const CMD_SOCKET_DEFAULT_OFF: [u8; 3] = [b'F', b'Q', b'H'];
pub const CMD_SOCKET_STATE: [u8; 3] = [0xA1, 0xA2, 0xAC];
pub const CMD_SOCKET_DEFAULT_STATE: [u8; 3] = [0xA3, 0xA4, 0xAD];

// ── Digital IO (catalogued, unused) ──

pub const CMD_SET_IO_DIRECTION: u8 = 0xD1;
pub const CMD_SET_IO_OUTPUT: u8 = 0xD3;
pub const CMD_GET_IO_INPUT: u8 = 0xD4;
pub const CMD_SET_IO_CLOCK: u8 = 0xD5;
pub const CMD_GET_IO_OUTPUT: u8 = 0xD6;
pub const CMD_SET_IO_TRIGGER: u8 = 0xD7;
pub const CMD_SET_IO_SETPLC: u8 = 0xD8;
pub const CMD_SET_IO_GETPLC: u8 = 0xD9;
pub const CMD_SET_IO_CLRPLC: u8 = 0xDA;

// ── Computer Watchdog (catalogued, unused) ──

pub const CMD_START_WDT: u8 = 0x90;
pub const CMD_STOP_WDT: u8 = 0x91;
pub const CMD_POWER_CYCLE: u8 = 0x92;
/// Returns the full watchdog status block.
pub const CMD_READ_WDT: u8 = 0x93;
pub const CMD_HEART_BEAT: u8 = 0x94;
pub const CMD_SHUTDOWN_OFFON: u8 = 0x95;

// ── Smart (catalogued, unused) ──

pub const CMD_SET_ONOFF: u8 = 0x81;
pub const CMD_GET_ONOFF: u8 = 0x82;
pub const CMD_SET_FREQ: u8 = 0x83;
pub const CMD_SET_ONOFFMODE: u8 = 0x84;
pub const CMD_SET_MODE_SMART: u8 = 0x85;
pub const CMD_SET_TVLIMIT: u8 = 0x86;
pub const CMD_SET_DATETIME: u8 = 0x87;
pub const CMD_DISP_TEXT: u8 = 0x88;
pub const CMD_SET_PASS: u8 = 0x89;
