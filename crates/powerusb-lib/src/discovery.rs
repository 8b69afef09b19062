//! Strip discovery: pick PowerUSB HID devices out of the USB device list.

use crate::config::Config;
use crate::error::Result;
use crate::protocol::USB_CLASS_PER_INTERFACE;
use crate::strip::Strip;
use crate::transport::{Transport, UsbDeviceInfo};

/// True for a per-interface-class device with matching IDs and a HID interface.
pub fn is_strip(info: &UsbDeviceInfo, vendor_id: u16, product_id: u16) -> bool {
    info.device_class == USB_CLASS_PER_INTERFACE
        && info.vendor_id == vendor_id
        && info.product_id == product_id
        && info.hid_interface().is_some()
}

/// Descriptors of all attached strips, ordered by bus then device address.
///
/// An empty bus is not an error.
pub fn find_strips<T: Transport>(
    transport: &T,
    vendor_id: u16,
    product_id: u16,
) -> Result<Vec<UsbDeviceInfo>> {
    let mut found: Vec<UsbDeviceInfo> = transport
        .enumerate()?
        .into_iter()
        .filter(|d| is_strip(d, vendor_id, product_id))
        .collect();
    // Numeric bus ids sort numerically; anything else after them, by text.
    found.sort_by(|a, b| {
        let key = |d: &UsbDeviceInfo| (d.bus_number().unwrap_or(u32::MAX), d.bus_id.clone());
        key(a)
            .cmp(&key(b))
            .then(a.device_address.cmp(&b.device_address))
    });
    log::debug!(
        "found {} strip(s) with {vendor_id:04x}:{product_id:04x}",
        found.len()
    );
    Ok(found)
}

/// One unopened [`Strip`] per attached PowerUSB device, with default settings.
pub fn list_strips<T: Transport>(transport: &T) -> Result<Vec<Strip<T>>> {
    list_strips_with(transport, &Config::default())
}

/// Like [`list_strips`], applying IDs, timing and labels from `config`.
pub fn list_strips_with<T: Transport>(transport: &T, config: &Config) -> Result<Vec<Strip<T>>> {
    let infos = find_strips(transport, config.vendor_id, config.product_id)?;
    Ok(infos
        .into_iter()
        .map(|info| {
            let label = config.label_for(&info).map(str::to_string);
            let strip = Strip::new(transport.clone(), info)
                .with_timing(config.settle_delay(), config.read_timeout());
            match label {
                Some(l) => strip.with_label(l),
                None => strip,
            }
        })
        .collect())
}
