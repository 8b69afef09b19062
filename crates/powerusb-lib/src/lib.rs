//! PowerUSB: discovery and control of USB switched power strips.

pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod selector;
pub mod socket;
pub mod strip;
pub mod transport;

pub use discovery::{find_strips, list_strips, list_strips_with};
pub use error::PowerUsbError;
pub use socket::{PowerState, Socket, SocketIndex};
pub use strip::{Session, Strip, StripStatus};
