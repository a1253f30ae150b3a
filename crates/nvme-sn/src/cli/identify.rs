//! Identity output, plain text or JSON.

use super::{CliError, ControllerSummary, DriveIdentity, ErrorOutput, Result, format_kv, kv_width};

const BANNER: &str = "---------- Disk Information ----------";

const CAPABILITY_KEYS: [&str; 8] = [
    "Vendor ID:",
    "Subsystem Vendor ID:",
    "Controller ID:",
    "NVMe Version:",
    "Namespaces:",
    "Power States:",
    "IEEE OUI:",
    "Namespace ID:",
];

/// Banner plus the model, firmware and serial lines.
pub(super) fn identity_lines(id: &DriveIdentity) -> Vec<String> {
    vec![
        BANNER.to_string(),
        format!("Model\t\t\t:{}", id.model),
        format!("FW Version\t\t:{}", id.firmware),
        format!("Serial No\t\t:{}", id.serial),
    ]
}

pub(super) fn capability_lines(c: &ControllerSummary) -> Vec<String> {
    let w = kv_width(&CAPABILITY_KEYS);
    let [vid, ssvid, cntlid, ver, nn, ps, oui, nsid] = CAPABILITY_KEYS;
    vec![
        "Controller:".to_string(),
        format_kv(vid, format_args!("0x{:04X}", c.vid), w),
        format_kv(ssvid, format_args!("0x{:04X}", c.ssvid), w),
        format_kv(cntlid, c.cntlid, w),
        format_kv(ver, c.version.as_deref().unwrap_or("unknown"), w),
        format_kv(nn, c.namespace_count, w),
        format_kv(ps, c.power_states, w),
        format_kv(oui, format_args!("{:06X}", c.ieee_oui), w),
        format_kv(nsid, format_args!("0x{:X}", c.namespace_id), w),
    ]
}

pub(super) fn print_identity(id: &DriveIdentity, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(id)?);
        return Ok(());
    }

    for line in identity_lines(id) {
        println!("{line}");
    }
    if let Some(ref c) = id.controller {
        println!();
        for line in capability_lines(c) {
            println!("{line}");
        }
    }
    Ok(())
}

pub(super) fn print_error_json(path: &str, err: &CliError) -> Result<()> {
    let output = ErrorOutput {
        device: path.to_string(),
        error: err.to_string(),
        not_found: matches!(err, CliError::NotFound(_)),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
