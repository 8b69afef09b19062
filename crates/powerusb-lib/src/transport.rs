//! USB transport: trait + nusb backend.
//!
//! The core never talks to USB directly. [`Transport`] enumerates devices and
//! opens a [`StripHandle`]; the handle does fixed-size interrupt writes and
//! timed reads. Discovery filtering and the protocol live above this layer.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::USB_CLASS_HID;

// ── Error type ──

/// Transport errors.
///
/// String payloads follow the convention **"context: details"** where *context*
/// identifies the step (e.g. `"usb:1/004: claim interface 0"`) and *details*
/// describes what went wrong.
#[derive(Debug)]
pub enum DeviceError {
    /// Enumerating the bus failed.
    Discovery(String),
    /// The device could not be opened (claimed elsewhere, vanished, no access).
    Unavailable(String),
    /// Operation attempted on a strip without an open session.
    NotOpen,
    /// No response within the read timeout.
    Timeout,
    /// A write or read transfer failed.
    Transfer(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Discovery(e) => write!(f, "USB enumeration failed: {e}"),
            DeviceError::Unavailable(e) => write!(f, "Strip unavailable: {e}"),
            DeviceError::NotOpen => write!(f, "Strip is not open"),
            DeviceError::Timeout => write!(f, "Read timed out"),
            DeviceError::Transfer(e) => write!(f, "Transfer failed: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Device info ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSummary {
    pub number: u8,
    pub class: u8,
}

/// One USB device as seen during enumeration (not opened).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbDeviceInfo {
    pub bus_id: String,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    /// `bDeviceClass`.
    pub device_class: u8,
    pub interfaces: Vec<InterfaceSummary>,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl UsbDeviceInfo {
    /// Stable location string, e.g. `usb:1/004`.
    pub fn path(&self) -> String {
        format!("usb:{}/{:03}", self.bus_id, self.device_address)
    }

    /// Bus number when the bus id is numeric (it is on Linux).
    pub fn bus_number(&self) -> Option<u32> {
        self.bus_id.parse().ok()
    }

    /// First HID interface number, if the device has one.
    pub fn hid_interface(&self) -> Option<u8> {
        self.interfaces
            .iter()
            .find(|i| i.class == USB_CLASS_HID)
            .map(|i| i.number)
    }
}

// ── Traits ──

/// An open, exclusively claimed channel to one device.
pub trait StripHandle {
    /// Write one frame. Returns the number of bytes transferred.
    fn write(&mut self, frame: &[u8]) -> Result<usize>;

    /// Read up to `max_len` bytes. May return fewer. [`DeviceError::Timeout`]
    /// when nothing arrives in time.
    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Release the device. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    fn manufacturer_string(&self) -> Option<String>;
    fn product_string(&self) -> Option<String>;
}

/// Device enumeration and open.
pub trait Transport: Clone {
    type Handle: StripHandle;

    /// Every device on every bus, unfiltered.
    fn enumerate(&self) -> Result<Vec<UsbDeviceInfo>>;

    fn open(&self, info: &UsbDeviceInfo) -> Result<Self::Handle>;
}

// ── Linux backend (nusb) ──

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;

    use nusb::MaybeFuture;
    use nusb::descriptors::TransferType;
    use nusb::transfer::{Direction, EndpointDirection, In, Interrupt, Out};

    use crate::protocol::{DEFAULT_ENDPOINT_IN, DEFAULT_ENDPOINT_OUT};

    /// Upper bound for an OUT transfer to complete.
    const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

    /// How long to wait for cancelled transfers to drain.
    const CANCEL_TIMEOUT: Duration = Duration::from_millis(100);

    #[derive(Debug, Clone, Copy, Default)]
    pub struct NusbTransport;

    pub struct NusbHandle {
        path: String,
        ep_out: Option<nusb::Endpoint<Interrupt, Out>>,
        ep_in: Option<nusb::Endpoint<Interrupt, In>>,
        interface: Option<nusb::Interface>,
        manufacturer: Option<String>,
        product: Option<String>,
    }

    fn describe(dev: &nusb::DeviceInfo) -> UsbDeviceInfo {
        UsbDeviceInfo {
            bus_id: dev.bus_id().to_string(),
            device_address: dev.device_address(),
            vendor_id: dev.vendor_id(),
            product_id: dev.product_id(),
            device_class: dev.class(),
            interfaces: dev
                .interfaces()
                .map(|i| InterfaceSummary {
                    number: i.interface_number(),
                    class: i.class(),
                })
                .collect(),
            serial: dev.serial_number().map(str::to_string),
            manufacturer: dev.manufacturer_string().map(str::to_string),
            product: dev.product_string().map(str::to_string),
        }
    }

    /// Interrupt endpoint addresses (IN, OUT) of one interface, falling back
    /// to the PIC defaults when the descriptors do not list them.
    fn interrupt_endpoints(device: &nusb::Device, iface_num: u8) -> (u8, u8) {
        let mut ep_in = DEFAULT_ENDPOINT_IN;
        let mut ep_out = DEFAULT_ENDPOINT_OUT;
        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != iface_num {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() != TransferType::Interrupt {
                            continue;
                        }
                        if ep.direction() == Direction::In {
                            ep_in = ep.address();
                        } else {
                            ep_out = ep.address();
                        }
                    }
                }
            }
        }
        (ep_in, ep_out)
    }

    fn cancel<Dir: EndpointDirection>(ep: &mut nusb::Endpoint<Interrupt, Dir>) {
        ep.cancel_all();
        while ep.pending() > 0 {
            if ep.wait_next_complete(CANCEL_TIMEOUT).is_none() {
                break;
            }
        }
    }

    impl Transport for NusbTransport {
        type Handle = NusbHandle;

        fn enumerate(&self) -> Result<Vec<UsbDeviceInfo>> {
            let devices = nusb::list_devices()
                .wait()
                .map_err(|e| DeviceError::Discovery(format!("list devices: {e}")))?;
            Ok(devices.map(|d| describe(&d)).collect())
        }

        fn open(&self, info: &UsbDeviceInfo) -> Result<NusbHandle> {
            let path = info.path();

            let dev_info = nusb::list_devices()
                .wait()
                .map_err(|e| DeviceError::Unavailable(format!("{path}: list devices: {e}")))?
                .find(|d| {
                    d.bus_id() == info.bus_id && d.device_address() == info.device_address
                })
                .ok_or_else(|| DeviceError::Unavailable(format!("{path}: device vanished")))?;

            let iface_num = info
                .hid_interface()
                .ok_or_else(|| DeviceError::Unavailable(format!("{path}: no HID interface")))?;

            let device = dev_info
                .open()
                .wait()
                .map_err(|e| DeviceError::Unavailable(format!("{path}: open: {e}")))?;

            let (in_addr, out_addr) = interrupt_endpoints(&device, iface_num);

            // Detaches usbhid if it holds the interface.
            let interface = device
                .detach_and_claim_interface(iface_num)
                .wait()
                .map_err(|e| {
                    DeviceError::Unavailable(format!("{path}: claim interface {iface_num}: {e}"))
                })?;

            let ep_out = interface
                .endpoint::<Interrupt, Out>(out_addr)
                .map_err(|e| {
                    DeviceError::Unavailable(format!("{path}: endpoint 0x{out_addr:02x}: {e}"))
                })?;
            let ep_in = interface.endpoint::<Interrupt, In>(in_addr).map_err(|e| {
                DeviceError::Unavailable(format!("{path}: endpoint 0x{in_addr:02x}: {e}"))
            })?;

            log::debug!(
                "{path}: claimed interface {iface_num} (in 0x{in_addr:02x}, out 0x{out_addr:02x})"
            );

            Ok(NusbHandle {
                path,
                ep_out: Some(ep_out),
                ep_in: Some(ep_in),
                interface: Some(interface),
                manufacturer: info.manufacturer.clone(),
                product: info.product.clone(),
            })
        }
    }

    impl StripHandle for NusbHandle {
        fn write(&mut self, frame: &[u8]) -> Result<usize> {
            let ep = self.ep_out.as_mut().ok_or(DeviceError::NotOpen)?;
            ep.submit(frame.to_vec().into());
            let Some(completion) = ep.wait_next_complete(WRITE_TIMEOUT) else {
                cancel(ep);
                return Err(DeviceError::Transfer(format!("{}: write timed out", self.path)));
            };
            completion
                .status
                .map_err(|e| DeviceError::Transfer(format!("{}: write: {e}", self.path)))?;
            Ok(completion.actual_len)
        }

        fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
            let ep = self.ep_in.as_mut().ok_or(DeviceError::NotOpen)?;
            // IN requests must be a whole number of packets.
            let packet = ep.max_packet_size().max(1);
            let request_len = max_len.max(1).div_ceil(packet) * packet;
            let buffer = ep.allocate(request_len);
            ep.submit(buffer);
            let Some(completion) = ep.wait_next_complete(timeout) else {
                cancel(ep);
                return Err(DeviceError::Timeout);
            };
            completion
                .status
                .map_err(|e| DeviceError::Transfer(format!("{}: read: {e}", self.path)))?;
            let n = completion
                .actual_len
                .min(completion.buffer.len())
                .min(max_len);
            Ok(completion.buffer[..n].to_vec())
        }

        fn close(&mut self) -> Result<()> {
            if let Some(mut ep) = self.ep_in.take() {
                cancel(&mut ep);
            }
            if let Some(mut ep) = self.ep_out.take() {
                cancel(&mut ep);
            }
            if self.interface.take().is_some() {
                log::debug!("{}: released interface", self.path);
            }
            Ok(())
        }

        fn manufacturer_string(&self) -> Option<String> {
            self.manufacturer.clone()
        }

        fn product_string(&self) -> Option<String> {
            self.product.clone()
        }
    }

    impl Drop for NusbHandle {
        fn drop(&mut self) {
            let _ = self.close();
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux_impl::{NusbHandle, NusbTransport};

// ── Stub transport for unsupported platforms ──

/// Transport that sees no devices.
/// Enables compilation and `cargo test` on unsupported hosts.
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct StubTransport;

/// Uninhabited: [`StubTransport::open`] never succeeds.
#[cfg(not(target_os = "linux"))]
pub enum StubHandle {}

#[cfg(not(target_os = "linux"))]
impl Transport for StubTransport {
    type Handle = StubHandle;

    fn enumerate(&self) -> Result<Vec<UsbDeviceInfo>> {
        Ok(Vec::new())
    }

    fn open(&self, info: &UsbDeviceInfo) -> Result<StubHandle> {
        Err(DeviceError::Unavailable(format!(
            "{}: USB access is not supported on this platform",
            info.path()
        )))
    }
}

#[cfg(not(target_os = "linux"))]
impl StripHandle for StubHandle {
    fn write(&mut self, _frame: &[u8]) -> Result<usize> {
        match *self {}
    }
    fn read(&mut self, _max_len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        match *self {}
    }
    fn close(&mut self) -> Result<()> {
        match *self {}
    }
    fn manufacturer_string(&self) -> Option<String> {
        match *self {}
    }
    fn product_string(&self) -> Option<String> {
        match *self {}
    }
}

/// Concrete transport type for the current platform.
#[cfg(target_os = "linux")]
pub type PlatformTransport = NusbTransport;
#[cfg(not(target_os = "linux"))]
pub type PlatformTransport = StubTransport;

// ── Mock transport for testing ──

/// In-memory simulated strips for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;
    use std::time::Instant;

    use crate::protocol::*;

    /// A USB descriptor that passes strip discovery.
    pub fn strip_info(bus_id: &str, address: u8, serial: Option<&str>) -> UsbDeviceInfo {
        UsbDeviceInfo {
            serial: serial.map(str::to_string),
            manufacturer: Some("Microchip Technology Inc.".into()),
            product: Some("Power USB".into()),
            ..usb_info(bus_id, address, POWERUSB_VID, POWERUSB_PID, 0, &[USB_CLASS_HID])
        }
    }

    /// An arbitrary USB descriptor.
    pub fn usb_info(
        bus_id: &str,
        address: u8,
        vendor_id: u16,
        product_id: u16,
        device_class: u8,
        interface_classes: &[u8],
    ) -> UsbDeviceInfo {
        UsbDeviceInfo {
            bus_id: bus_id.into(),
            device_address: address,
            vendor_id,
            product_id,
            device_class,
            interfaces: interface_classes
                .iter()
                .enumerate()
                .map(|(n, &class)| InterfaceSummary {
                    number: n as u8,
                    class,
                })
                .collect(),
            serial: None,
            manufacturer: None,
            product: None,
        }
    }

    /// Simulated strip firmware. Answers read commands from its state and
    /// applies write commands to it.
    pub struct MockFirmware {
        pub info: UsbDeviceInfo,
        pub power: Cell<[bool; 3]>,
        pub defaults: Cell<[bool; 3]>,
        pub model_byte: Cell<u8>,
        pub firmware: Cell<(u8, u8)>,
        pub current_ma: Cell<u16>,
        pub cumulative: Cell<u32>,
        pub overload: Cell<u8>,
        pub mode: Cell<u8>,
        pub current_ratio: Cell<u8>,
        pub board_resets: Cell<u32>,
        pub offset_calibrations: Cell<u32>,
        /// Every frame written, in order.
        pub frames: RefCell<Vec<Vec<u8>>>,
        /// Time between each read and the write before it.
        pub write_read_gaps: RefCell<Vec<Duration>>,
        /// Canned replies per opcode, consumed before the simulated state.
        pub response_overrides: RefCell<HashMap<u8, VecDeque<Vec<u8>>>>,
        pub opens: Cell<u32>,
        pub closes: Cell<u32>,
        pub claimed: Cell<bool>,
        /// If true, every read times out.
        pub fail_reads: Cell<bool>,
        /// If true, every write fails.
        pub fail_writes: Cell<bool>,
        pending: RefCell<Option<Vec<u8>>>,
        last_write: Cell<Option<Instant>>,
    }

    impl MockFirmware {
        pub fn new(info: UsbDeviceInfo) -> Self {
            MockFirmware {
                info,
                power: Cell::new([false; 3]),
                defaults: Cell::new([false; 3]),
                model_byte: Cell::new(1),
                firmware: Cell::new((1, 5)),
                current_ma: Cell::new(0),
                cumulative: Cell::new(0),
                overload: Cell::new(0),
                mode: Cell::new(0),
                current_ratio: Cell::new(0),
                board_resets: Cell::new(0),
                offset_calibrations: Cell::new(0),
                frames: RefCell::new(Vec::new()),
                write_read_gaps: RefCell::new(Vec::new()),
                response_overrides: RefCell::new(HashMap::new()),
                opens: Cell::new(0),
                closes: Cell::new(0),
                claimed: Cell::new(false),
                fail_reads: Cell::new(false),
                fail_writes: Cell::new(false),
                pending: RefCell::new(None),
                last_write: Cell::new(None),
            }
        }

        /// Queue a raw reply for the next command with this opcode.
        pub fn add_response(&self, opcode: u8, reply: Vec<u8>) {
            self.response_overrides
                .borrow_mut()
                .entry(opcode)
                .or_default()
                .push_back(reply);
        }

        /// Opcodes of all frames written so far.
        pub fn opcodes(&self) -> Vec<u8> {
            self.frames.borrow().iter().map(|f| f[0]).collect()
        }

        fn take_override(&self, opcode: u8) -> Option<Vec<u8>> {
            self.response_overrides
                .borrow_mut()
                .get_mut(&opcode)
                .and_then(VecDeque::pop_front)
        }

        fn set_slot(cell: &Cell<[bool; 3]>, i: usize, on: bool) {
            let mut v = cell.get();
            v[i] = on;
            cell.set(v);
        }

        fn socket_command(&self, op: u8) -> Option<Vec<u8>> {
            let pos = |table: [u8; 3]| table.iter().position(|&b| b == op);
            if let Some(i) = pos(CMD_SOCKET_ON) {
                Self::set_slot(&self.power, i, true);
            } else if let Some(i) = pos(CMD_SOCKET_OFF) {
                Self::set_slot(&self.power, i, false);
            } else if let Some(i) = pos(CMD_SOCKET_DEFAULT_ON) {
                Self::set_slot(&self.defaults, i, true);
            } else if let Some(i) = pos(CMD_SOCKET_DEFAULT_OFF) {
                Self::set_slot(&self.defaults, i, false);
            } else if let Some(i) = pos(CMD_SOCKET_STATE) {
                return Some(vec![self.power.get()[i] as u8]);
            } else if let Some(i) = pos(CMD_SOCKET_DEFAULT_STATE) {
                return Some(vec![self.defaults.get()[i] as u8]);
            }
            None
        }

        /// Apply one command. Returns the reply for read commands.
        fn execute(&self, op: u8, value: u8) -> Option<Vec<u8>> {
            match op {
                CMD_READ_MODEL => Some(vec![self.model_byte.get()]),
                CMD_READ_FIRMWARE_VER => {
                    let (major, minor) = self.firmware.get();
                    Some(vec![major, minor])
                }
                CMD_READ_CURRENT => Some(self.current_ma.get().to_be_bytes().to_vec()),
                CMD_READ_CURRENT_CUM => Some(self.cumulative.get().to_be_bytes().to_vec()),
                CMD_RESET_CURRENT_COUNT => {
                    self.cumulative.set(0);
                    None
                }
                CMD_WRITE_OVERLOAD => {
                    self.overload.set(value);
                    None
                }
                CMD_READ_OVERLOAD => Some(vec![self.overload.get()]),
                CMD_SET_CURRENT_RATIO => {
                    self.current_ratio.set(value);
                    None
                }
                CMD_ALL_PORT_ON => {
                    self.power.set([true; 3]);
                    None
                }
                CMD_ALL_PORT_OFF => {
                    self.power.set([false; 3]);
                    None
                }
                CMD_SET_MODE => {
                    self.mode.set(value);
                    None
                }
                CMD_READ_MODE => Some(vec![self.mode.get()]),
                CMD_RESET_BOARD => {
                    self.board_resets.set(self.board_resets.get() + 1);
                    None
                }
                CMD_SET_CURRENT_OFFSET => {
                    self.offset_calibrations
                        .set(self.offset_calibrations.get() + 1);
                    None
                }
                _ => self.socket_command(op),
            }
        }

        fn on_write(&self, frame: &[u8]) -> Result<usize> {
            if self.fail_writes.get() {
                return Err(DeviceError::Transfer("mock: write failure injected".into()));
            }
            if frame.len() != FRAME_LEN {
                return Err(DeviceError::Transfer(format!(
                    "mock: frame is {} bytes, expected {FRAME_LEN}",
                    frame.len()
                )));
            }
            self.frames.borrow_mut().push(frame.to_vec());
            self.last_write.set(Some(Instant::now()));
            let (op, value) = (frame[0], frame[1]);
            let reply = match self.take_override(op) {
                Some(r) => Some(r),
                None => self.execute(op, value),
            };
            *self.pending.borrow_mut() = reply;
            Ok(frame.len())
        }

        fn on_read(&self, max_len: usize) -> Result<Vec<u8>> {
            if let Some(at) = self.last_write.get() {
                self.write_read_gaps.borrow_mut().push(at.elapsed());
            }
            if self.fail_reads.get() {
                return Err(DeviceError::Timeout);
            }
            let mut reply = self.pending.borrow_mut().take().ok_or(DeviceError::Timeout)?;
            reply.truncate(max_len);
            Ok(reply)
        }
    }

    /// Cloneable handle to a shared set of simulated devices.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub devices: Rc<RefCell<Vec<Rc<MockFirmware>>>>,
        /// If true, `enumerate` fails.
        pub fail_enumerate: Rc<Cell<bool>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Attach a device to the simulated bus.
        pub fn add_device(&self, info: UsbDeviceInfo) -> Rc<MockFirmware> {
            let fw = Rc::new(MockFirmware::new(info));
            self.devices.borrow_mut().push(Rc::clone(&fw));
            fw
        }

        /// Attach a strip that passes discovery.
        pub fn add_strip(&self, bus_id: &str, address: u8) -> Rc<MockFirmware> {
            self.add_device(strip_info(bus_id, address, None))
        }

        /// Detach a device, as if unplugged.
        pub fn remove_device(&self, bus_id: &str, address: u8) {
            self.devices
                .borrow_mut()
                .retain(|d| !(d.info.bus_id == bus_id && d.info.device_address == address));
        }
    }

    pub struct MockHandle {
        firmware: Rc<MockFirmware>,
        open: bool,
    }

    impl Transport for MockTransport {
        type Handle = MockHandle;

        fn enumerate(&self) -> Result<Vec<UsbDeviceInfo>> {
            if self.fail_enumerate.get() {
                return Err(DeviceError::Discovery("mock: enumerate failure injected".into()));
            }
            Ok(self.devices.borrow().iter().map(|d| d.info.clone()).collect())
        }

        fn open(&self, info: &UsbDeviceInfo) -> Result<MockHandle> {
            let firmware = self
                .devices
                .borrow()
                .iter()
                .find(|d| {
                    d.info.bus_id == info.bus_id && d.info.device_address == info.device_address
                })
                .cloned()
                .ok_or_else(|| DeviceError::Unavailable(format!("{}: device vanished", info.path())))?;
            if firmware.claimed.get() {
                return Err(DeviceError::Unavailable(format!(
                    "{}: interface already claimed",
                    info.path()
                )));
            }
            firmware.claimed.set(true);
            firmware.opens.set(firmware.opens.get() + 1);
            Ok(MockHandle {
                firmware,
                open: true,
            })
        }
    }

    impl StripHandle for MockHandle {
        fn write(&mut self, frame: &[u8]) -> Result<usize> {
            if !self.open {
                return Err(DeviceError::NotOpen);
            }
            self.firmware.on_write(frame)
        }

        fn read(&mut self, max_len: usize, _timeout: Duration) -> Result<Vec<u8>> {
            if !self.open {
                return Err(DeviceError::NotOpen);
            }
            self.firmware.on_read(max_len)
        }

        fn close(&mut self) -> Result<()> {
            if self.open {
                self.open = false;
                self.firmware.claimed.set(false);
                self.firmware.closes.set(self.firmware.closes.get() + 1);
            }
            Ok(())
        }

        fn manufacturer_string(&self) -> Option<String> {
            self.firmware.info.manufacturer.clone()
        }

        fn product_string(&self) -> Option<String> {
            self.firmware.info.product.clone()
        }
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            let _ = self.close();
        }
    }
}
