//! CLI subcommands: discovery, socket switching, metering, strip settings.

mod config_cmd;
mod meter;
mod socket;
mod status;
mod strip_cmd;
mod strips;
mod watch;

use std::path::Path;
use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use powerusb_lib::config::Config;
pub(super) use powerusb_lib::error::Result;
pub(super) use powerusb_lib::selector::{SocketSpec, StripSelector};
pub(super) use powerusb_lib::transport::{PlatformTransport, Transport};
pub(super) use powerusb_lib::{PowerState, PowerUsbError, Strip, StripStatus, list_strips_with};

const PADDING: usize = 2;

pub(super) const NO_STRIPS: &str = "No PowerUSB strips found.";

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn json_error(e: serde_json::Error) -> PowerUsbError {
    PowerUsbError::Config(format!("JSON serialization failed: {e}"))
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(json_error)?;
    println!("{text}");
    Ok(())
}

/// Load the config from `custom_path` or the default location, logging
/// parse warnings and validation problems. Never fails.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("{w}");
    }
    if let Err(errors) = config.validate() {
        for e in &errors {
            log::warn!("config: {e}");
        }
    }
    config
}

/// Zero strips is not an error. In JSON mode the notice goes to stderr so
/// stdout stays parseable.
pub(super) fn report_no_strips(json: bool) {
    if json {
        eprintln!("{NO_STRIPS}");
    } else {
        println!("{NO_STRIPS}");
    }
}

/// Discover strips, open the one `selector` names and run `f` against the
/// open session. Returns `Ok(None)` when no strip is attached.
///
/// The session is closed before returning, on success and on error.
pub(super) fn with_strip<T: Transport, R>(
    transport: &T,
    config: &Config,
    selector: &StripSelector,
    json: bool,
    f: impl FnOnce(&Strip<T>) -> Result<R>,
) -> Result<Option<R>> {
    let strips = list_strips_with(transport, config)?;
    if strips.is_empty() {
        report_no_strips(json);
        return Ok(None);
    }
    let strip = selector.resolve(&strips)?;
    let session = strip.open()?;
    let out = f(&session)?;
    session.close()?;
    Ok(Some(out))
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StripsOutput {
    pub count: usize,
    pub strips: Vec<StripSummaryJson>,
}

#[derive(Serialize)]
pub(super) struct StripSummaryJson {
    /// 1-based, usable as a strip selector.
    pub index: usize,
    pub path: String,
    pub serial: Option<String>,
    pub label: Option<String>,
    pub details: Option<StripDetailsJson>,
    /// Why `details` is missing, if the strip could not be queried.
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct StripDetailsJson {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub model: String,
    pub firmware: String,
    pub current_ma: u16,
    pub sockets: Vec<PowerState>,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    #[serde(flatten)]
    pub status: StripStatus,
}

#[derive(Serialize)]
pub(super) struct SocketOutput {
    pub strip: String,
    pub socket: u8,
    /// "live" or "default" (power-on state).
    pub target: &'static str,
    pub state: PowerState,
    /// True if the state was written, false if it was read.
    pub changed: bool,
}

#[derive(Serialize)]
pub(super) struct MeterOutput {
    pub strip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ma: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_kwh: Option<f64>,
    pub counter_reset: bool,
}

#[derive(Serialize)]
pub(super) struct StripActionOutput {
    pub strip: String,
    pub action: &'static str,
    /// Value read, or value written for setters.
    pub value: Option<u8>,
}

#[derive(Serialize)]
pub(super) struct WatchSample {
    pub elapsed_s: f64,
    pub current_ma: u16,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct InitOutput {
    pub config_file: String,
    pub overwritten: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List connected PowerUSB strips
    Strips,

    /// Show model, firmware, meter and socket states of one strip
    Status {
        /// Strip number, bus address (1:4), serial or label
        strip: StripSelector,
    },

    /// Read or switch sockets
    Socket {
        /// One or more <strip>:<socket> specs, e.g. 1:2 or rack:3
        #[arg(required = true)]
        sockets: Vec<SocketSpec>,
        /// Switch the sockets on
        #[arg(long, conflicts_with = "off")]
        on: bool,
        /// Switch the sockets off
        #[arg(long)]
        off: bool,
        /// Act on the power-on default instead of the live state
        #[arg(long)]
        default: bool,
    },

    /// Read the current meter
    Meter {
        /// Strip number, bus address (1:4), serial or label
        strip: StripSelector,
        /// Report cumulative energy in kWh instead of instantaneous current
        #[arg(long, conflicts_with = "reset")]
        cumulative: bool,
        /// Reset the cumulative energy counter
        #[arg(long)]
        reset: bool,
    },

    /// Strip-wide actions and settings
    Strip {
        /// Strip number, bus address (1:4), serial or label
        strip: StripSelector,
        #[command(subcommand)]
        action: StripAction,
    },

    /// Print current draw periodically until Ctrl+C
    Watch {
        /// Strip number, bus address (1:4), serial or label
        strip: StripSelector,
        /// Seconds between samples
        #[arg(long, default_value = "1", value_parser = parse_interval)]
        interval: Duration,
        /// Stop after this many samples
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,
    },

    /// Show current configuration and file path
    Config {
        /// Write a config file with default settings
        #[arg(long)]
        init: bool,
        /// With --init, overwrite an existing file
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripAction {
    /// Switch every socket on
    AllOn,
    /// Switch every socket off
    AllOff,
    /// Reset the strip's controller
    Reset,
    /// Read the overload threshold, or set it
    Overload { value: Option<u8> },
    /// Read the operating mode, or set it
    Mode { value: Option<u8> },
    /// Set the current meter ratio
    CurrentRatio { value: u8 },
    /// Calibrate the current meter's zero offset
    CurrentOffset,
}

/// How often `watch` rechecks the shutdown flag while waiting.
pub(super) const WATCH_TICK: Duration = Duration::from_millis(100);

/// `--interval` value: a positive, finite number of seconds.
fn parse_interval(s: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("\"{s}\" is not a number of seconds"))?;
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("must be a positive number of seconds, got {s}")),
    }
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let transport = PlatformTransport::default();

    match cmd {
        Command::Strips => strips::cmd_strips(&transport, &config, json),
        Command::Status { strip } => status::cmd_status(&transport, &config, &strip, json),
        Command::Socket {
            sockets,
            on,
            off,
            default,
        } => {
            let set = match (on, off) {
                (true, _) => Some(PowerState::On),
                (_, true) => Some(PowerState::Off),
                _ => None,
            };
            socket::cmd_socket(&transport, &config, &sockets, set, default, json)
        }
        Command::Meter {
            strip,
            cumulative,
            reset,
        } => {
            let reading = if reset {
                meter::Reading::Reset
            } else if cumulative {
                meter::Reading::Cumulative
            } else {
                meter::Reading::Current
            };
            meter::cmd_meter(&transport, &config, &strip, reading, json)
        }
        Command::Strip { strip, action } => {
            strip_cmd::cmd_strip(&transport, &config, &strip, action, json)
        }
        Command::Watch {
            strip,
            interval,
            count,
        } => watch::cmd_watch(&transport, &config, &strip, interval, count, json),
        Command::Config { init: true, force } => config_cmd::cmd_init(config_path, force, json),
        Command::Config { init: false, .. } => config_cmd::cmd_config(&config, config_path, json),
    }
}
