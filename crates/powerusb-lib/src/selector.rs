//! Strip and socket selection from user-supplied strings.
//!
//! A strip is named by its 1-based position in the discovery list (`2`), by
//! bus and device address (`1:4` or `usb:1/004`), or by serial number or
//! configured label. A socket spec appends `:<socket>` to any of those.

use std::fmt;
use std::str::FromStr;

use crate::error::{PowerUsbError, Result};
use crate::socket::SocketIndex;
use crate::strip::Strip;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripSelector {
    /// 1-based position in discovery order.
    Index(usize),
    BusAddress { bus: String, address: u8 },
    /// Serial number or label.
    Name(String),
}

fn parse_bus_address(s: &str) -> Option<(String, u8)> {
    let (bus, addr) = match s.strip_prefix("usb:") {
        Some(rest) => rest.split_once('/')?,
        None => s.split_once(':')?,
    };
    if bus.is_empty() || !bus.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let address = addr.parse().ok()?;
    let bus = match bus.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    Some((bus.to_string(), address))
}

fn same_bus(a: &str, b: &str) -> bool {
    match (a.parse::<u32>(), b.parse::<u32>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

impl FromStr for StripSelector {
    type Err = PowerUsbError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PowerUsbError::Selector("empty strip selector".into()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return match s.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(StripSelector::Index(n)),
                _ => Err(PowerUsbError::Selector(format!(
                    "strip number must be 1 or greater, got \"{s}\""
                ))),
            };
        }
        if let Some((bus, address)) = parse_bus_address(s) {
            return Ok(StripSelector::BusAddress { bus, address });
        }
        Ok(StripSelector::Name(s.to_string()))
    }
}

impl fmt::Display for StripSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripSelector::Index(n) => write!(f, "#{n}"),
            StripSelector::BusAddress { bus, address } => write!(f, "usb:{bus}/{address:03}"),
            StripSelector::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

impl StripSelector {
    fn matches<T: Transport>(&self, strip: &Strip<T>) -> bool {
        match self {
            StripSelector::Index(_) => false,
            StripSelector::BusAddress { bus, address } => {
                strip.info().device_address == *address && same_bus(&strip.info().bus_id, bus)
            }
            StripSelector::Name(name) => {
                strip.label() == Some(name.as_str())
                    || strip.serial().is_some_and(|s| s.eq_ignore_ascii_case(name))
            }
        }
    }

    /// Pick exactly one strip from a discovery list.
    pub fn resolve<'a, T: Transport>(&self, strips: &'a [Strip<T>]) -> Result<&'a Strip<T>> {
        if strips.is_empty() {
            return Err(PowerUsbError::Selector("no strips attached".into()));
        }
        if let StripSelector::Index(n) = self {
            return n.checked_sub(1).and_then(|i| strips.get(i)).ok_or_else(|| {
                PowerUsbError::Selector(format!(
                    "no strip #{n} ({} attached)",
                    strips.len()
                ))
            });
        }
        let hits: Vec<&Strip<T>> = strips.iter().filter(|s| self.matches(s)).collect();
        match hits.as_slice() {
            [one] => Ok(*one),
            [] => {
                let available: Vec<String> = strips.iter().map(|s| s.to_string()).collect();
                Err(PowerUsbError::Selector(format!(
                    "no strip matches {self} (available: {})",
                    available.join(", ")
                )))
            }
            many => Err(PowerUsbError::Selector(format!(
                "{self} matches {} strips; use a bus address",
                many.len()
            ))),
        }
    }
}

/// `<strip>:<socket>`, e.g. `1:2`, `1:4:3`, `rack:1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSpec {
    pub strip: StripSelector,
    pub socket: SocketIndex,
}

impl FromStr for SocketSpec {
    type Err = PowerUsbError;

    fn from_str(s: &str) -> Result<Self> {
        let (strip, socket) = s.trim().rsplit_once(':').ok_or_else(|| {
            PowerUsbError::Selector(format!("expected <strip>:<socket>, got \"{s}\""))
        })?;
        Ok(SocketSpec {
            strip: strip.parse()?,
            socket: socket.parse()?,
        })
    }
}

impl fmt::Display for SocketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} socket {}", self.strip, self.socket)
    }
}
