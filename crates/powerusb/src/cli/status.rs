//! `status` subcommand: everything one strip reports.

use super::{
    Config, Result, StatusOutput, StripSelector, Transport, kv, kv_indent, kv_width, print_json,
    with_strip,
};

pub(super) fn read_status<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    json: bool,
) -> Result<Option<StatusOutput>> {
    with_strip(transport, config, selector, json, |strip| {
        Ok(StatusOutput {
            manufacturer: strip.manufacturer(),
            product: strip.product(),
            status: strip.status()?,
        })
    })
}

pub(super) fn cmd_status<T: Transport>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    json: bool,
) -> Result<()> {
    let Some(output) = read_status(transport, config, selector, json)? else {
        return Ok(());
    };

    if json {
        return print_json(&output);
    }

    let status = &output.status;
    let w = kv_width(
        &[
            "Strip:",
            "Serial:",
            "Manufacturer:",
            "Product:",
            "Model:",
            "Firmware:",
            "Current:",
            "Energy:",
        ],
        &["1:"],
    );

    match &status.label {
        Some(label) => kv("Strip:", format_args!("{label} ({})", status.path), w),
        None => kv("Strip:", &status.path, w),
    }
    kv("Serial:", status.serial.as_deref().unwrap_or("(none)"), w);
    if let Some(ref m) = output.manufacturer {
        kv("Manufacturer:", m, w);
    }
    if let Some(ref p) = output.product {
        kv("Product:", p, w);
    }
    kv("Model:", status.model, w);
    kv("Firmware:", &status.firmware, w);
    kv("Current:", format_args!("{} mA", status.current_ma), w);
    kv("Energy:", format_args!("{:.4} kWh", status.cumulative_kwh), w);
    println!();

    println!("Sockets:");
    for s in &status.sockets {
        kv_indent(
            &format!("{}:", s.index),
            format_args!("{:<3}  (default {})", s.power.to_string(), s.default),
            w,
        );
    }
    Ok(())
}
