//! One physical power strip and its scoped sessions.
//!
//! Every protocol operation is a single write → settle → read exchange on the
//! strip's handle. The handle slot is a `RefCell`, so an exchange holds the
//! handle exclusively for its whole duration and a `Strip` is not `Sync`.
//!
//! Model and firmware version are read once and cached for the life of the
//! `Strip` value, across sessions. Socket states and meter readings are
//! always read fresh.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::codec::{self, Command, FirmwareVersion, Model};
use crate::error::{PowerUsbError, Result};
use crate::protocol::{FRAME_LEN, READ_TIMEOUT, SETTLE_DELAY};
use crate::socket::{Socket, SocketIndex, SocketStatus};
use crate::transport::{DeviceError, StripHandle, Transport, UsbDeviceInfo};

pub struct Strip<T: Transport> {
    transport: T,
    info: UsbDeviceInfo,
    handle: RefCell<Option<T::Handle>>,
    model: OnceCell<Model>,
    firmware: OnceCell<FirmwareVersion>,
    settle_delay: Duration,
    read_timeout: Duration,
    label: Option<String>,
}

/// Snapshot of a strip, as printed by `powerusb status`.
#[derive(Debug, Clone, Serialize)]
pub struct StripStatus {
    pub path: String,
    pub serial: Option<String>,
    pub label: Option<String>,
    pub model: Model,
    pub firmware: String,
    pub current_ma: u16,
    pub cumulative_kwh: f64,
    pub sockets: Vec<SocketStatus>,
}

impl<T: Transport> Strip<T> {
    pub fn new(transport: T, info: UsbDeviceInfo) -> Self {
        Strip {
            transport,
            info,
            handle: RefCell::new(None),
            model: OnceCell::new(),
            firmware: OnceCell::new(),
            settle_delay: SETTLE_DELAY,
            read_timeout: READ_TIMEOUT,
            label: None,
        }
    }

    /// Override exchange timing. The settle delay never goes below 20 ms.
    pub fn with_timing(mut self, settle_delay: Duration, read_timeout: Duration) -> Self {
        self.settle_delay = settle_delay.max(SETTLE_DELAY);
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn info(&self) -> &UsbDeviceInfo {
        &self.info
    }

    /// Location string, e.g. `usb:1/004`.
    pub fn path(&self) -> String {
        self.info.path()
    }

    pub fn serial(&self) -> Option<&str> {
        self.info.serial.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    // ── Session ──

    /// Claim the device. The returned guard closes it again when dropped.
    pub fn open(&self) -> Result<Session<'_, T>> {
        let mut slot = self.handle.borrow_mut();
        if slot.is_some() {
            return Err(self.context(
                "open",
                DeviceError::Unavailable(format!("{}: session already open", self.path())).into(),
            ));
        }
        let handle = self
            .transport
            .open(&self.info)
            .map_err(|e| self.context("open", e.into()))?;
        *slot = Some(handle);
        log::info!("{}: session opened", self.path());
        Ok(Session { strip: self })
    }

    /// Release the device. Closing a closed strip is a no-op.
    pub fn close(&self) -> Result<()> {
        let taken = self.handle.borrow_mut().take();
        if let Some(mut handle) = taken {
            let result = handle.close();
            log::info!("{}: session closed", self.path());
            result.map_err(|e| self.context("close", e.into()))?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.handle.borrow().is_some()
    }

    // ── Exchange ──

    fn context(&self, op: &'static str, source: PowerUsbError) -> PowerUsbError {
        PowerUsbError::Operation {
            strip: self.path(),
            op,
            source: Box::new(source),
        }
    }

    /// Attach strip and operation context to an error.
    pub(crate) fn with_context<R, E: Into<PowerUsbError>>(
        &self,
        op: &'static str,
        result: std::result::Result<R, E>,
    ) -> Result<R> {
        result.map_err(|e| self.context(op, e.into()))
    }

    fn ensure_open(&self, op: &'static str) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(self.context(op, DeviceError::NotOpen.into()))
        }
    }

    fn transact(&self, cmd: Command, read: bool) -> Result<Vec<u8>> {
        let mut slot = self.handle.borrow_mut();
        let handle = slot
            .as_mut()
            .ok_or_else(|| self.context(cmd.name(), DeviceError::NotOpen.into()))?;

        log::debug!("{}: {} -> {:02X?}", self.path(), cmd.name(), cmd.bytes());
        handle
            .write(&cmd.frame())
            .map_err(|e| self.context(cmd.name(), e.into()))?;
        thread::sleep(self.settle_delay);
        if !read {
            return Ok(Vec::new());
        }

        let resp = handle
            .read(FRAME_LEN, self.read_timeout)
            .map_err(|e| self.context(cmd.name(), e.into()))?;
        log::debug!(
            "{}: {} <- {} bytes {:02X?}",
            self.path(),
            cmd.name(),
            resp.len(),
            &resp[..resp.len().min(4)]
        );
        Ok(resp)
    }

    /// Write a command and wait out the settle delay. No reply is read.
    pub(crate) fn send(&self, cmd: Command) -> Result<()> {
        self.transact(cmd, false).map(|_| ())
    }

    /// Write a command, settle, and read the reply.
    pub(crate) fn exchange(&self, cmd: Command) -> Result<Vec<u8>> {
        self.transact(cmd, true)
    }

    // ── Identity ──

    pub fn model(&self) -> Result<Model> {
        self.ensure_open(codec::READ_MODEL.name())?;
        if let Some(model) = self.model.get() {
            return Ok(*model);
        }
        let resp = self.exchange(codec::READ_MODEL)?;
        let model = self.with_context(codec::READ_MODEL.name(), codec::decode_model(&resp))?;
        Ok(*self.model.get_or_init(|| model))
    }

    pub fn firmware_version(&self) -> Result<FirmwareVersion> {
        let op = codec::READ_FIRMWARE_VERSION.name();
        self.ensure_open(op)?;
        if let Some(fw) = self.firmware.get() {
            return Ok(*fw);
        }
        let resp = self.exchange(codec::READ_FIRMWARE_VERSION)?;
        let fw = self.with_context(op, codec::decode_firmware_version(&resp))?;
        Ok(*self.firmware.get_or_init(|| fw))
    }

    /// Manufacturer string from the open handle, else from enumeration.
    pub fn manufacturer(&self) -> Option<String> {
        self.handle
            .borrow()
            .as_ref()
            .and_then(|h| h.manufacturer_string())
            .or_else(|| self.info.manufacturer.clone())
    }

    /// Product string from the open handle, else from enumeration.
    pub fn product(&self) -> Option<String> {
        self.handle
            .borrow()
            .as_ref()
            .and_then(|h| h.product_string())
            .or_else(|| self.info.product.clone())
    }

    // ── Meter ──

    /// Instantaneous current draw in mA.
    pub fn current_ma(&self) -> Result<u16> {
        let resp = self.exchange(codec::READ_CURRENT)?;
        if resp.len() < 2 {
            log::warn!(
                "{}: short current reading ({} bytes), reporting 0 mA",
                self.path(),
                resp.len()
            );
        }
        Ok(codec::decode_current(&resp))
    }

    /// Raw cumulative counter in mA·min since the last reset.
    pub fn cumulative_raw(&self) -> Result<u32> {
        let resp = self.exchange(codec::READ_CUMULATIVE)?;
        if resp.len() < 4 {
            log::warn!(
                "{}: short cumulative reading ({} bytes), reporting 0",
                self.path(),
                resp.len()
            );
        }
        Ok(codec::decode_cumulative(&resp))
    }

    /// Cumulative energy in kWh, assuming 120 V mains.
    pub fn cumulative_kwh(&self) -> Result<f64> {
        self.cumulative_raw().map(codec::kwh_from_raw)
    }

    pub fn reset_counter(&self) -> Result<()> {
        self.send(codec::RESET_COUNTER)
    }

    // ── Strip-wide actions ──

    pub fn all_on(&self) -> Result<()> {
        self.send(codec::ALL_ON)
    }

    pub fn all_off(&self) -> Result<()> {
        self.send(codec::ALL_OFF)
    }

    /// Reboot the strip's controller.
    pub fn reset(&self) -> Result<()> {
        self.send(codec::RESET_BOARD)
    }

    /// Overload threshold (raw firmware units).
    pub fn overload(&self) -> Result<u8> {
        let op = codec::READ_OVERLOAD.name();
        let resp = self.exchange(codec::READ_OVERLOAD)?;
        self.with_context(op, codec::decode_byte(op, &resp))
    }

    pub fn set_overload(&self, value: u8) -> Result<()> {
        self.send(codec::write_overload(value))
    }

    /// Operating mode byte, uninterpreted.
    pub fn mode(&self) -> Result<u8> {
        let op = codec::READ_MODE.name();
        let resp = self.exchange(codec::READ_MODE)?;
        self.with_context(op, codec::decode_byte(op, &resp))
    }

    pub fn set_mode(&self, value: u8) -> Result<()> {
        self.send(codec::set_mode(value))
    }

    pub fn set_current_ratio(&self, value: u8) -> Result<()> {
        self.send(codec::set_current_ratio(value))
    }

    /// Calibrate the current sensor's zero point against the present load.
    pub fn set_current_offset(&self) -> Result<()> {
        self.send(codec::SET_CURRENT_OFFSET)
    }

    // ── Sockets ──

    /// Socket by 1-based number. Fails for anything outside 1..=3.
    pub fn socket(&self, n: u8) -> Result<Socket<'_, T>> {
        Ok(Socket::new(self, SocketIndex::new(n)?))
    }

    pub fn socket_at(&self, index: SocketIndex) -> Socket<'_, T> {
        Socket::new(self, index)
    }

    pub fn sockets(&self) -> [Socket<'_, T>; 3] {
        SocketIndex::ALL.map(|i| Socket::new(self, i))
    }

    pub fn status(&self) -> Result<StripStatus> {
        let sockets = self
            .sockets()
            .iter()
            .map(Socket::status)
            .collect::<Result<Vec<_>>>()?;
        Ok(StripStatus {
            path: self.path(),
            serial: self.info.serial.clone(),
            label: self.label.clone(),
            model: self.model()?,
            firmware: self.firmware_version()?.to_string(),
            current_ma: self.current_ma()?,
            cumulative_kwh: self.cumulative_kwh()?,
            sockets,
        })
    }
}

/// Label if one is configured, else the bus path.
impl<T: Transport> fmt::Display for Strip<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label} ({})", self.path()),
            None => write!(f, "{}", self.path()),
        }
    }
}

impl<T: Transport> fmt::Debug for Strip<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strip")
            .field("path", &self.path())
            .field("label", &self.label)
            .field("open", &self.is_open())
            .finish()
    }
}

// ── Session guard ──

/// An open strip. Dereferences to the [`Strip`]; closes it on drop.
pub struct Session<'a, T: Transport> {
    strip: &'a Strip<T>,
}

impl<T: Transport> Session<'_, T> {
    /// Close now and report any error. Dropping the guard closes silently.
    pub fn close(self) -> Result<()> {
        self.strip.close()
    }
}

impl<T: Transport> Deref for Session<'_, T> {
    type Target = Strip<T>;

    fn deref(&self) -> &Strip<T> {
        self.strip
    }
}

impl<T: Transport> Drop for Session<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.strip.close() {
            log::warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::*;
    use crate::socket::PowerState;
    use crate::transport::mock::{MockTransport, strip_info};

    fn strip() -> (MockTransport, std::rc::Rc<crate::transport::mock::MockFirmware>, Strip<MockTransport>) {
        let t = MockTransport::new();
        let fw = t.add_device(strip_info("1", 4, Some("SN1")));
        let s = Strip::new(t.clone(), fw.info.clone());
        (t, fw, s)
    }

    #[test]
    fn operations_on_closed_strip_are_not_open() {
        let (_t, fw, s) = strip();
        assert!(s.model().unwrap_err().is_not_open());
        assert!(s.current_ma().unwrap_err().is_not_open());
        assert!(s.all_on().unwrap_err().is_not_open());
        assert!(s.socket(1).unwrap().power().unwrap_err().is_not_open());
        assert!(fw.frames.borrow().is_empty());
        assert_eq!(fw.opens.get(), 0);
    }

    #[test]
    fn session_closes_on_drop() {
        let (_t, fw, s) = strip();
        {
            let session = s.open().unwrap();
            assert!(session.is_open());
            assert!(fw.claimed.get());
        }
        assert!(!s.is_open());
        assert!(!fw.claimed.get());
        assert_eq!(fw.closes.get(), 1);
    }

    #[test]
    fn double_open_is_rejected() {
        let (_t, fw, s) = strip();
        let _session = s.open().unwrap();
        let err = s.open().err().unwrap();
        assert!(matches!(
            err.root(),
            PowerUsbError::Device(DeviceError::Unavailable(_))
        ));
        assert_eq!(fw.opens.get(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let (_t, fw, s) = strip();
        let session = s.open().unwrap();
        s.close().unwrap();
        s.close().unwrap();
        drop(session);
        assert_eq!(fw.closes.get(), 1);
    }

    #[test]
    fn model_is_cached_across_sessions() {
        let (_t, fw, s) = strip();
        fw.model_byte.set(4);
        {
            let session = s.open().unwrap();
            assert_eq!(session.model().unwrap(), Model::SmartPro);
            assert_eq!(session.model().unwrap(), Model::SmartPro);
        }
        let session = s.open().unwrap();
        assert_eq!(session.model().unwrap(), Model::SmartPro);
        let reads = fw.opcodes().iter().filter(|&&op| op == CMD_READ_MODEL).count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn unknown_model_is_not_cached() {
        let (_t, fw, s) = strip();
        fw.model_byte.set(0);
        let session = s.open().unwrap();
        let err = session.model().unwrap_err();
        assert!(err.to_string().contains("read model"));
        fw.model_byte.set(1);
        assert_eq!(session.model().unwrap(), Model::Basic);
    }

    #[test]
    fn firmware_version_reads_two_bytes() {
        let (_t, fw, s) = strip();
        fw.firmware.set((3, 1));
        let session = s.open().unwrap();
        assert_eq!(session.firmware_version().unwrap().to_string(), "3.1");
    }

    #[test]
    fn reset_counter_sends_b3() {
        let (_t, fw, s) = strip();
        fw.cumulative.set(1234);
        let session = s.open().unwrap();
        session.reset_counter().unwrap();
        assert_eq!(fw.opcodes(), vec![CMD_RESET_CURRENT_COUNT]);
        assert_eq!(session.cumulative_raw().unwrap(), 0);
    }

    #[test]
    fn cumulative_kwh_converts() {
        let (_t, fw, s) = strip();
        fw.cumulative.set(500_000);
        let session = s.open().unwrap();
        assert_eq!(session.cumulative_kwh().unwrap(), 1.0);
    }

    #[test]
    fn empty_current_reply_is_zero() {
        let (_t, fw, s) = strip();
        let session = s.open().unwrap();
        for _ in 0..3 {
            fw.add_response(CMD_READ_CURRENT, vec![]);
            assert_eq!(session.current_ma().unwrap(), 0);
        }
    }

    #[test]
    fn overload_and_mode_round_trip() {
        let (_t, fw, s) = strip();
        let session = s.open().unwrap();
        session.set_overload(12).unwrap();
        session.set_mode(2).unwrap();
        assert_eq!(session.overload().unwrap(), 12);
        assert_eq!(session.mode().unwrap(), 2);
        assert_eq!(fw.frames.borrow()[0][..2], [CMD_WRITE_OVERLOAD, 12]);
    }

    #[test]
    fn empty_overload_reply_is_short_read() {
        let (_t, fw, s) = strip();
        let session = s.open().unwrap();
        fw.add_response(CMD_READ_OVERLOAD, vec![]);
        let err = session.overload().unwrap_err();
        assert!(matches!(
            err.root(),
            PowerUsbError::Decode(codec::DecodeError::ShortRead { .. })
        ));
    }

    #[test]
    fn calibration_commands() {
        let (_t, fw, s) = strip();
        let session = s.open().unwrap();
        session.set_current_ratio(9).unwrap();
        session.set_current_offset().unwrap();
        assert_eq!(fw.current_ratio.get(), 9);
        assert_eq!(fw.offset_calibrations.get(), 1);
        assert_eq!(fw.frames.borrow()[1][1], 0xFF, "offset takes no value byte");
    }

    #[test]
    fn all_on_all_off_and_reset() {
        let (_t, fw, s) = strip();
        let session = s.open().unwrap();
        session.all_on().unwrap();
        assert_eq!(fw.power.get(), [true; 3]);
        session.all_off().unwrap();
        assert_eq!(fw.power.get(), [false; 3]);
        session.reset().unwrap();
        assert_eq!(fw.board_resets.get(), 1);
    }

    #[test]
    fn timeout_names_strip_and_operation() {
        let (_t, fw, s) = strip();
        let session = s.open().unwrap();
        fw.fail_reads.set(true);
        let err = session.overload().unwrap_err();
        assert_eq!(err.to_string(), "usb:1/004: read overload: Read timed out");
    }

    #[test]
    fn settle_delay_is_clamped() {
        let (t, fw, _) = strip();
        let s = Strip::new(t, fw.info.clone())
            .with_timing(Duration::from_millis(1), Duration::from_millis(50));
        assert_eq!(s.settle_delay(), Duration::from_millis(20));
    }

    #[test]
    fn status_snapshot() {
        let (_t, fw, s) = strip();
        fw.current_ma.set(300);
        fw.power.set([true, false, true]);
        fw.defaults.set([false, false, true]);
        let s = s.with_label("rack");
        let session = s.open().unwrap();
        let st = session.status().unwrap();
        assert_eq!(st.path, "usb:1/004");
        assert_eq!(st.serial.as_deref(), Some("SN1"));
        assert_eq!(st.label.as_deref(), Some("rack"));
        assert_eq!(st.model, Model::Basic);
        assert_eq!(st.firmware, "1.5");
        assert_eq!(st.current_ma, 300);
        let powers: Vec<PowerState> = st.sockets.iter().map(|s| s.power).collect();
        assert_eq!(powers, [PowerState::On, PowerState::Off, PowerState::On]);
        assert_eq!(st.sockets[2].default, PowerState::On);
    }

    #[test]
    fn display_uses_label() {
        let (_t, _fw, s) = strip();
        assert_eq!(s.to_string(), "usb:1/004");
        let s = s.with_label("rack");
        assert_eq!(s.to_string(), "rack (usb:1/004)");
    }

    #[test]
    fn manufacturer_and_product_strings() {
        let (_t, _fw, s) = strip();
        assert_eq!(s.product().as_deref(), Some("Power USB"));
        let session = s.open().unwrap();
        assert_eq!(
            session.manufacturer().as_deref(),
            Some("Microchip Technology Inc.")
        );
    }
}
