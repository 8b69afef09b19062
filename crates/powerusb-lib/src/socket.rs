//! Sockets: the three switched outlets of a strip.
//!
//! Socket state is never cached. Every read goes to the firmware and every
//! write is sent straight through, since the strip's buttons or another
//! host can change state at any time.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::codec;
use crate::error::{PowerUsbError, Result};
use crate::strip::Strip;
use crate::transport::Transport;

/// Number of switched sockets on every strip.
pub const SOCKET_COUNT: usize = 3;

/// Socket number, always in 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SocketIndex(u8);

impl SocketIndex {
    pub const ALL: [SocketIndex; SOCKET_COUNT] = [SocketIndex(1), SocketIndex(2), SocketIndex(3)];

    pub fn new(n: u8) -> Result<Self> {
        if (1..=SOCKET_COUNT as u8).contains(&n) {
            Ok(SocketIndex(n))
        } else {
            Err(PowerUsbError::InvalidSocket(n))
        }
    }

    /// 1-based socket number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// 0-based position in the command tables.
    pub(crate) fn offset(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl FromStr for SocketIndex {
    type Err = PowerUsbError;

    fn from_str(s: &str) -> Result<Self> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| PowerUsbError::Selector(format!("invalid socket number \"{s}\"")))?;
        SocketIndex::new(n)
    }
}

impl fmt::Display for SocketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// On/off state of a socket (live or default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Off,
    On,
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { PowerState::On } else { PowerState::Off }
    }
}

/// Accepts `"on"` / `"off"` (any case, surrounding whitespace ignored).
impl FromStr for PowerState {
    type Err = PowerUsbError;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("on") {
            Ok(PowerState::On)
        } else if t.eq_ignore_ascii_case("off") {
            Ok(PowerState::Off)
        } else {
            Err(PowerUsbError::InvalidPowerState(s.to_string()))
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerState::Off => "off",
            PowerState::On => "on",
        })
    }
}

/// Snapshot of one socket, as reported by [`Socket::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketStatus {
    pub index: SocketIndex,
    pub power: PowerState,
    pub default: PowerState,
}

/// One outlet of a [`Strip`]. Borrows the strip; never owns it.
pub struct Socket<'a, T: Transport> {
    strip: &'a Strip<T>,
    index: SocketIndex,
}

impl<'a, T: Transport> Socket<'a, T> {
    pub(crate) fn new(strip: &'a Strip<T>, index: SocketIndex) -> Self {
        Socket { strip, index }
    }

    pub fn index(&self) -> SocketIndex {
        self.index
    }

    pub fn strip(&self) -> &'a Strip<T> {
        self.strip
    }

    /// Read the live power state from the device.
    pub fn power(&self) -> Result<PowerState> {
        let cmd = codec::read_socket_power(self.index);
        let resp = self.strip.exchange(cmd)?;
        self.strip
            .with_context(cmd.name(), codec::decode_power_state(cmd.name(), &resp))
    }

    /// Switch the socket on or off. No read-back is performed.
    pub fn set_power(&self, state: impl Into<PowerState>) -> Result<()> {
        self.strip
            .send(codec::set_socket_power(self.index, state.into()))
    }

    /// Read the power-up default state from the device.
    pub fn default_power(&self) -> Result<PowerState> {
        let cmd = codec::read_socket_default(self.index);
        let resp = self.strip.exchange(cmd)?;
        self.strip
            .with_context(cmd.name(), codec::decode_power_state(cmd.name(), &resp))
    }

    /// Set the state the socket assumes when the strip regains power.
    pub fn set_default_power(&self, state: impl Into<PowerState>) -> Result<()> {
        self.strip
            .send(codec::set_socket_default(self.index, state.into()))
    }

    pub fn status(&self) -> Result<SocketStatus> {
        Ok(SocketStatus {
            index: self.index,
            power: self.power()?,
            default: self.default_power()?,
        })
    }
}
