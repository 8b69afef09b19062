//! Unified error type for the powerusb-lib crate.
//!
//! [`PowerUsbError`] wraps module-specific errors (`DeviceError`, `DecodeError`)
//! and domain-specific error kinds (`InvalidSocket`, `Selector`, `Config`).
//! `From` impls allow `?` to propagate across module boundaries.

use std::fmt;

use crate::codec::DecodeError;
use crate::transport::DeviceError;

/// Unified error type for powerusb-lib operations.
#[derive(Debug)]
pub enum PowerUsbError {
    /// Transport error (enumerate, open, read, write).
    Device(DeviceError),
    /// Response could not be decoded.
    Decode(DecodeError),
    /// Socket number outside 1..=3.
    InvalidSocket(u8),
    /// Power state string other than "on"/"off".
    InvalidPowerState(String),
    /// A strip operation failed; names the strip and the operation.
    Operation {
        strip: String,
        op: &'static str,
        source: Box<PowerUsbError>,
    },
    /// Strip or socket selector could not be parsed or resolved.
    Selector(String),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl PowerUsbError {
    /// The innermost error, skipping any `Operation` context.
    pub fn root(&self) -> &PowerUsbError {
        match self {
            PowerUsbError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the root cause is a closed strip.
    pub fn is_not_open(&self) -> bool {
        matches!(self.root(), PowerUsbError::Device(DeviceError::NotOpen))
    }
}

impl fmt::Display for PowerUsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerUsbError::Device(e) => write!(f, "{e}"),
            PowerUsbError::Decode(e) => write!(f, "Decode error: {e}"),
            PowerUsbError::InvalidSocket(n) => {
                write!(f, "Invalid socket {n} (expected 1, 2 or 3)")
            }
            PowerUsbError::InvalidPowerState(s) => {
                write!(f, "Invalid power state \"{s}\" (expected on/off)")
            }
            PowerUsbError::Operation { strip, op, source } => {
                write!(f, "{strip}: {op}: {source}")
            }
            PowerUsbError::Selector(e) => write!(f, "Selector error: {e}"),
            PowerUsbError::Io(e) => write!(f, "I/O error: {e}"),
            PowerUsbError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for PowerUsbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PowerUsbError::Device(e) => Some(e),
            PowerUsbError::Decode(e) => Some(e),
            PowerUsbError::Operation { source, .. } => Some(source.as_ref()),
            PowerUsbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for PowerUsbError {
    fn from(e: DeviceError) -> Self {
        PowerUsbError::Device(e)
    }
}

impl From<DecodeError> for PowerUsbError {
    fn from(e: DecodeError) -> Self {
        PowerUsbError::Decode(e)
    }
}

impl From<std::io::Error> for PowerUsbError {
    fn from(e: std::io::Error) -> Self {
        PowerUsbError::Io(e)
    }
}

/// Crate-level Result alias using [`PowerUsbError`].
pub type Result<T> = std::result::Result<T, PowerUsbError>;
