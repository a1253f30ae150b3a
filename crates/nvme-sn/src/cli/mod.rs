//! CLI surface: resolves the device path and reports failures.

mod identify;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub(super) use nvme_sn_lib::byteorder::ByteOrder;
pub(super) use nvme_sn_lib::config::{self, Config};
pub(super) use nvme_sn_lib::error::NvmeSnError;
pub(super) use nvme_sn_lib::query::{self, ControllerSummary, DriveIdentity, QueryOptions};

const PADDING: usize = 2;

/// Alignment width for an indented key-value block: at least PADDING
/// spaces after the longest key.
pub(super) fn kv_width(keys: &[&str]) -> usize {
    keys.iter().map(|k| k.len()).max().map_or(0, |m| m + PADDING)
}

pub(super) fn format_kv(key: &str, value: impl fmt::Display, w: usize) -> String {
    format!("  {key:<width$}{value}", width = w)
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ErrorOutput {
    pub device: String,
    pub error: String,
    pub not_found: bool,
}

// ── Errors ──

/// Failures reported to the user; each maps to exit status 1.
#[derive(Debug)]
pub enum CliError {
    /// The device node could not be opened.
    NotFound(String),
    /// The node opened but the identify command failed.
    Query { path: String, source: NvmeSnError },
    /// `--write-config` could not save the config.
    WriteConfig(NvmeSnError),
    /// JSON serialisation failed.
    Json(serde_json::Error),
}

impl CliError {
    fn from_query(path: &str, e: NvmeSnError) -> Self {
        if e.is_not_found() {
            log::debug!("{e}");
            CliError::NotFound(path.to_string())
        } else {
            CliError::Query {
                path: path.to_string(),
                source: e,
            }
        }
    }

    /// Not-found goes to stdout like the rest of the plain report; with
    /// `--json` the error object already carries it.
    pub fn goes_to_stdout(&self, json: bool) -> bool {
        matches!(self, CliError::NotFound(_)) && !json
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::NotFound(path) => write!(f, "{path} device not found."),
            CliError::Query { path, source } => {
                write!(f, "{path}: failed to read controller identity: {source}")
            }
            CliError::WriteConfig(e) => write!(f, "failed to write config: {e}"),
            CliError::Json(e) => write!(f, "failed to encode JSON output: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::NotFound(_) => None,
            CliError::Query { source, .. } | CliError::WriteConfig(source) => Some(source),
            CliError::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

// ── Entry ──

/// Parsed command line.
pub struct Options {
    pub device: Option<String>,
    pub json: bool,
    pub capabilities: bool,
    pub config: Option<PathBuf>,
    pub write_config: bool,
}

fn load_config(path: Option<&PathBuf>) -> Config {
    let config = match path {
        Some(p) => {
            let (config, warnings) = Config::load_from(p);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    };
    if let Err(errors) = config.validate() {
        for e in &errors {
            log::warn!("{e}");
        }
    }
    config
}

/// Pick the device path: command line first, then config.  `None` when
/// neither names an NVMe device.
fn resolve_device(arg: Option<&str>, config: &Config) -> Option<String> {
    let path = arg.or_else(|| config.default_device())?;
    config::is_nvme_path(path).then(|| path.to_string())
}

pub(super) fn usage() -> String {
    "Usage:\n  nvme-sn-tool <nvme_device>".to_string()
}

/// Store the effective config (with `device` as the new default) and
/// report where it went.
fn write_config(mut config: Config, device: Option<&str>, path: Option<&Path>) -> Result<()> {
    if let Some(d) = device {
        config.default_device = d.to_string();
    }
    let written = config.save(path).map_err(CliError::WriteConfig)?;
    println!("Saved config to {}", written.display());
    Ok(())
}

pub fn run(opts: Options, host: ByteOrder) -> Result<()> {
    let config = load_config(opts.config.as_ref());

    if opts.write_config {
        return write_config(config, opts.device.as_deref(), opts.config.as_deref());
    }

    let Some(path) = resolve_device(opts.device.as_deref(), &config) else {
        println!("{}", usage());
        return Ok(());
    };

    let query_opts = QueryOptions {
        capabilities: opts.capabilities,
        ..QueryOptions::from_config(&config, host)
    };
    log::debug!(
        "{path}: host {host}, {} open, timeout {} ms",
        config.channel_options().open_mode,
        query_opts.timeout_ms
    );

    match query::get_nvme_id_info(&path, &config, query_opts) {
        Ok(id) => identify::print_identity(&id, opts.json),
        Err(e) => {
            let err = CliError::from_query(&path, e);
            if opts.json {
                identify::print_error_json(&path, &err)?;
            }
            Err(err)
        }
    }
}
