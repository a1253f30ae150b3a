//! Application configuration: TOML file under the platform config dir.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::{ChannelOptions, OpenMode};
use crate::error::NvmeSnError;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# nvme-sn configuration\n\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device queried when none is given on the command line. Empty = none.
    #[serde(default)]
    pub default_device: String,

    /// Namespace id for the channel. 0 = ask the device node.
    #[serde(default)]
    pub namespace_id: u32,

    /// "read-only" (default) or "read-write". Read-write falls back to
    /// read-only when the node sits on a read-only filesystem.
    #[serde(default = "default_open_mode")]
    pub open_mode: String,

    /// Admin command timeout in milliseconds. 0 = kernel default.
    #[serde(default)]
    pub admin_timeout_ms: u32,
}

fn default_open_mode() -> String {
    "read-only".into()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_device: String::new(),
            namespace_id: 0,
            open_mode: default_open_mode(),
            admin_timeout_ms: 0,
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `open_mode` is not one of the known modes.
    InvalidOpenMode(String),
    /// `default_device` does not look like an NVMe device node.
    InvalidDefaultDevice(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidOpenMode(m) => {
                write!(
                    f,
                    "Invalid open_mode: \"{m}\" (expected \"read-only\" or \"read-write\")"
                )
            }
            ValidationError::InvalidDefaultDevice(d) => {
                write!(f, "Invalid default_device: \"{d}\" is not an NVMe device")
            }
        }
    }
}

/// True if `path` names an NVMe device node (e.g. `/dev/nvme0`, `/dev/nvme0n1`).
pub fn is_nvme_path(path: &str) -> bool {
    path.contains("nvme")
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nvme-sn"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Validate, then save to `path` (or the default platform path).
    ///
    /// An invalid config is never written.  Returns the path written.
    pub fn save(&self, path: Option<&Path>) -> crate::error::Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::path()
                .ok_or_else(|| NvmeSnError::Config("no config directory".into()))?,
        };
        if let Err(errors) = self.validate() {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(NvmeSnError::Config(msgs.join("; ")));
        }
        self.save_to(&path)?;
        Ok(path)
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

    /// Parse `open_mode`. Case-insensitive; `_` and `-` are interchangeable.
    pub fn parse_open_mode(&self) -> Option<OpenMode> {
        match self.open_mode.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "" | "read-only" | "ro" => Some(OpenMode::ReadOnly),
            "read-write" | "rw" => Some(OpenMode::ReadWrite),
            _ => None,
        }
    }

    /// Device path from config, if one is set.
    pub fn default_device(&self) -> Option<&str> {
        let d = self.default_device.trim();
        (!d.is_empty()).then_some(d)
    }

    /// Channel settings derived from this config.  An unrecognised
    /// `open_mode` falls back to read-only.
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            namespace_id: self.namespace_id,
            open_mode: self.parse_open_mode().unwrap_or_default(),
        }
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.parse_open_mode().is_none() {
            errors.push(ValidationError::InvalidOpenMode(self.open_mode.clone()));
        }

        if let Some(dev) = self.default_device()
            && !is_nvme_path(dev)
        {
            errors.push(ValidationError::InvalidDefaultDevice(dev.to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
