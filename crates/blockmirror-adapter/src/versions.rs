//! Device identification parsing. The identification string is `KEY: value`
//! pairs with spaces allowed inside both, so extraction anchors on the known
//! key names; an unrecognized extra key makes the whole string unsplittable
//! and every version degrades to "Unknown".

use tracing::{error, warn};

const UNKNOWN: &str = "Unknown";
const KEYS: [&str; 3] = ["SW", "FPGA", "rootfs"];

/// Firmware versions reported by the device, exposed as a read-only info
/// group next to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceVersions {
    pub software: String,
    pub fpga: String,
    pub rootfs: String,
}

impl DeviceVersions {
    pub fn parse(identification: &str) -> Self {
        let recognized = KEYS
            .iter()
            .filter(|key| identification.contains(&format!("{key}:")))
            .count();
        if identification.matches(':').count() > recognized {
            error!(identification, "unexpected keys in identification string");
            return Self::unknown();
        }

        let mut versions = [UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string()];
        for (slot, key) in versions.iter_mut().zip(KEYS) {
            match extract(identification, key) {
                Some(value) => *slot = value,
                None => warn!(key, "missing version in identification string"),
            }
        }
        let [software, fpga, rootfs] = versions;
        Self {
            software,
            fpga,
            rootfs,
        }
    }

    fn unknown() -> Self {
        Self {
            software: UNKNOWN.to_string(),
            fpga: UNKNOWN.to_string(),
            rootfs: UNKNOWN.to_string(),
        }
    }
}

/// Value for `key`: the text after `KEY:` up to the next known key (or the
/// end), trimmed.
fn extract(identification: &str, key: &str) -> Option<String> {
    let marker = format!("{key}:");
    let start = identification.find(&marker)? + marker.len();
    let rest = &identification[start..];
    let end = KEYS
        .iter()
        .filter(|other| **other != key)
        .filter_map(|other| rest.find(&format!("{other}:")))
        .min()
        .unwrap_or(rest.len());
    let value = rest[..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}
