//! Drive identity query over one channel session.

use serde::Serialize;

use crate::byteorder::ByteOrder;
use crate::config::Config;
use crate::device::{NvmeChannel, PlatformDevice};
use crate::error::Result;
use crate::field::format_char_array;
use crate::identify::{ControllerIdentity, IdentifyReader};

/// Scratch size for field extraction; fits the widest field (model, 40 bytes).
const FIELD_BUF_LEN: usize = 64;

/// Printable identity of one drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveIdentity {
    pub device: String,
    pub model: String,
    pub firmware: String,
    pub serial: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerSummary>,
}

/// Decoded controller numbers, shown with `--capabilities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSummary {
    pub vid: u16,
    pub ssvid: u16,
    pub cntlid: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub namespace_count: u32,
    pub power_states: usize,
    pub ieee_oui: u32,
    /// Namespace id the channel resolved on open.
    pub namespace_id: u32,
}

impl ControllerSummary {
    pub fn new(id: &ControllerIdentity, namespace_id: u32) -> Self {
        ControllerSummary {
            vid: id.vid(),
            ssvid: id.ssvid(),
            cntlid: id.cntlid(),
            version: id.version(),
            namespace_count: id.namespace_count(),
            power_states: id.power_state_count(),
            ieee_oui: id.ieee_oui(),
            namespace_id,
        }
    }
}

/// Options for [`query_identity`].
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub host: ByteOrder,
    /// Admin command timeout; 0 = kernel default.
    pub timeout_ms: u32,
    /// Also decode the [`ControllerSummary`].
    pub capabilities: bool,
}

impl QueryOptions {
    pub fn new(host: ByteOrder) -> Self {
        QueryOptions {
            host,
            timeout_ms: 0,
            capabilities: false,
        }
    }

    /// Host order plus the timeout configured in `config`.
    pub fn from_config(config: &Config, host: ByteOrder) -> Self {
        QueryOptions {
            timeout_ms: config.admin_timeout_ms,
            ..Self::new(host)
        }
    }
}

/// Open `dev`, read the controller identity, close `dev`.
///
/// The channel is closed whether or not the identify command succeeds.
pub fn query_identity(dev: &mut impl NvmeChannel, opts: QueryOptions) -> Result<DriveIdentity> {
    dev.open()?;
    let result = IdentifyReader::new(opts.host)
        .with_timeout(opts.timeout_ms)
        .read_controller(dev);
    let namespace_id = dev.namespace_id();
    dev.close();
    let id = result?;

    let mut buf = [0u8; FIELD_BUF_LEN];
    let model = format_char_array(&mut buf, id.model_bytes()).to_string();
    let firmware = format_char_array(&mut buf, id.firmware_bytes()).to_string();
    let serial = format_char_array(&mut buf, id.serial_bytes()).to_string();

    Ok(DriveIdentity {
        device: dev.info().path.clone(),
        model,
        firmware,
        serial,
        controller: opts
            .capabilities
            .then(|| ControllerSummary::new(&id, namespace_id)),
    })
}

/// Query the NVMe device at `path` using the channel settings in `config`.
pub fn get_nvme_id_info(path: &str, config: &Config, opts: QueryOptions) -> Result<DriveIdentity> {
    let mut dev = PlatformDevice::new(path, config.channel_options());
    query_identity(&mut dev, opts)
}
