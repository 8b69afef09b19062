//! Client configuration: TOML-based, platform-aware paths.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PowerUsbError, Result};
use crate::protocol::{POWERUSB_PID, POWERUSB_VID, READ_TIMEOUT, SETTLE_DELAY};
use crate::transport::UsbDeviceInfo;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# PowerUSB configuration. Changes made outside the tool may be overwritten.\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Wait between a command write and its read, in ms. Never below 20.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Timeout for one response read, in ms.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// USB vendor ID used for discovery. Default: 0x04d8.
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    /// USB product ID used for discovery. Default: 0x003f.
    #[serde(default = "default_product_id")]
    pub product_id: u16,

    /// Strip labels, keyed by serial number or `usb:<bus>/<addr>` path.
    /// Example in TOML: `[labels]` / `"usb:1/004" = "rack"`
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_settle_delay_ms() -> u64 {
    SETTLE_DELAY.as_millis() as u64
}
fn default_read_timeout_ms() -> u64 {
    READ_TIMEOUT.as_millis() as u64
}
fn default_vendor_id() -> u16 {
    POWERUSB_VID
}
fn default_product_id() -> u16 {
    POWERUSB_PID
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settle_delay_ms: default_settle_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            labels: BTreeMap::new(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `read_timeout_ms` is zero.
    ZeroReadTimeout,
    /// A `labels` entry has an empty key or an empty label.
    EmptyLabel { strip: String },
    /// The same label is assigned to more than one strip.
    DuplicateLabel { label: String, strips: Vec<String> },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroReadTimeout => write!(f, "read_timeout_ms must be greater than 0"),
            ValidationError::EmptyLabel { strip } => {
                write!(f, "Invalid labels[\"{strip}\"]: strip and label must be non-empty")
            }
            ValidationError::DuplicateLabel { label, strips } => {
                write!(f, "Label \"{label}\" is used by {}", strips.join(", "))
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("powerusb"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Write this config to `path` as TOML behind a header comment, creating
    /// parent directories. The file is staged beside the target and renamed
    /// into place, so readers never see a partial file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| PowerUsbError::Config(format!("cannot serialize config: {e}")))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let staged = path.with_extension("toml.new");
        fs::write(&staged, format!("{CONFIG_HEADER}{body}"))?;
        if let Err(e) = fs::rename(&staged, path) {
            let _ = fs::remove_file(&staged);
            return Err(e.into());
        }
        log::info!("wrote {}", path.display());
        Ok(())
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Settle delay, clamped to the firmware minimum.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms).max(SETTLE_DELAY)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Label for a discovered strip. Serial-keyed entries win over path-keyed ones.
    pub fn label_for(&self, info: &UsbDeviceInfo) -> Option<&str> {
        info.serial
            .as_deref()
            .and_then(|s| self.labels.get(s))
            .or_else(|| self.labels.get(&info.path()))
            .map(String::as_str)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.read_timeout_ms == 0 {
            errors.push(ValidationError::ZeroReadTimeout);
        }

        let mut by_label: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (strip, label) in &self.labels {
            if strip.trim().is_empty() || label.trim().is_empty() {
                errors.push(ValidationError::EmptyLabel {
                    strip: strip.clone(),
                });
                continue;
            }
            by_label.entry(label.trim()).or_default().push(strip.clone());
        }
        for (label, strips) in by_label {
            if strips.len() > 1 {
                errors.push(ValidationError::DuplicateLabel {
                    label: label.to_string(),
                    strips,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
