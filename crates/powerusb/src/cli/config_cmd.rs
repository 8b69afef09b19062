//! `config` subcommand: show current configuration and file path.

use std::path::{Path, PathBuf};

use super::{
    Config, ConfigOutput, InitOutput, PowerUsbError, Result, kv, kv_indent, kv_width, print_json,
};

pub(super) fn config_output(config: &Config, custom_path: Option<&Path>) -> ConfigOutput {
    let config_path = custom_path.map(Path::to_path_buf).or_else(Config::path);
    let config_file_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };
    ConfigOutput {
        config_file: config_path.as_ref().map(|p| p.display().to_string()),
        config_file_exists,
        settings: config.clone(),
        problems,
    }
}

/// Write default settings to `custom_path` or the default location. An
/// existing file is only replaced with `force`. Returns the path and whether
/// a file was replaced.
pub(super) fn init_config(custom_path: Option<&Path>, force: bool) -> Result<(PathBuf, bool)> {
    let path = custom_path
        .map(Path::to_path_buf)
        .or_else(Config::path)
        .ok_or_else(|| {
            PowerUsbError::Config("no config directory on this system; pass --config <PATH>".into())
        })?;
    let existed = path.exists();
    if existed && !force {
        return Err(PowerUsbError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save_to(&path)?;
    Ok((path, existed))
}

pub(super) fn cmd_init(custom_path: Option<&Path>, force: bool, json: bool) -> Result<()> {
    let (path, overwritten) = init_config(custom_path, force)?;

    if json {
        return print_json(&InitOutput {
            config_file: path.display().to_string(),
            overwritten,
        });
    }

    let verb = if overwritten { "Replaced" } else { "Wrote" };
    println!("{verb} {} with default settings.", path.display());
    Ok(())
}

pub(super) fn cmd_config(config: &Config, custom_path: Option<&Path>, json: bool) -> Result<()> {
    let output = config_output(config, custom_path);

    if json {
        return print_json(&output);
    }

    let w = kv_width(
        &["Config file:"],
        &[
            "settle_delay_ms:",
            "read_timeout_ms:",
            "vendor_id:",
            "product_id:",
        ],
    );

    match (&output.config_file, output.config_file_exists) {
        (Some(p), true) => kv("Config file:", format_args!("{p} (loaded)"), w),
        (Some(p), false) => kv(
            "Config file:",
            format_args!("{p} (not found, using defaults)"),
            w,
        ),
        (None, _) => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    let settings = &output.settings;
    let effective_ms = settings.settle_delay().as_millis();
    let clamped = if effective_ms > u128::from(settings.settle_delay_ms) {
        format!(" (raised to {effective_ms} ms)")
    } else {
        String::new()
    };
    kv_indent(
        "settle_delay_ms:",
        format_args!("{}{clamped}", settings.settle_delay_ms),
        w,
    );
    kv_indent("read_timeout_ms:", settings.read_timeout_ms, w);
    kv_indent("vendor_id:", format_args!("{:#06x}", settings.vendor_id), w);
    kv_indent("product_id:", format_args!("{:#06x}", settings.product_id), w);
    println!();

    println!("Labels:");
    if settings.labels.is_empty() {
        println!("  (none)");
    }
    for (strip, label) in &settings.labels {
        println!("  {strip} = {label}");
    }

    if !output.problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &output.problems {
            println!("  {p}");
        }
    }
    Ok(())
}
