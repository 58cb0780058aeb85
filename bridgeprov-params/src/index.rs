//! Per-device index assignment.
//!
//! Every provisioned unit gets a unique station IP, hostname and access
//! point SSID derived from a running device index, unless the operator
//! supplies explicit values.

use crate::error::{ParamsError, ParamsResult};
use crate::store::ParamStore;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{info, warn};

/// Static station IP key.
pub const KEY_STATION_IP: &str = "ip_sta";
/// Hostname key.
pub const KEY_HOSTNAME: &str = "wifi_hostname";
/// Access point SSID key.
pub const KEY_AP_SSID: &str = "ssid_ap";

/// Explicit values that replace the index-derived ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOverrides {
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub ssid: Option<String>,
}

/// Which fields the pass actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub ip_updated: bool,
    pub hostname_updated: bool,
    pub ssid_updated: bool,
}

impl IndexReport {
    /// Returns true if at least one field was updated.
    #[must_use]
    pub fn any_updated(&self) -> bool {
        self.ip_updated || self.hostname_updated || self.ssid_updated
    }
}

/// Applies `index` (or the overrides) to the well-known per-device keys.
///
/// # Errors
///
/// Returns [`ParamsError::ConfigValidation`] if the override IP does not
/// parse (nothing is mutated in that case) or if no field ends up updated.
/// A valid override IP is written exactly as given, apart from surrounding
/// whitespace.
pub fn assign_index(
    config: &mut ParamStore,
    index: u32,
    overrides: &IndexOverrides,
) -> ParamsResult<IndexReport> {
    let override_ip = match overrides.ip.as_deref().map(str::trim) {
        Some(raw) => {
            raw.parse::<IpAddr>().map_err(|_| {
                ParamsError::ConfigValidation(format!("invalid IP address override '{raw}'"))
            })?;
            Some(raw)
        }
        None => None,
    };

    let mut report = IndexReport::default();

    let new_ip = match override_ip {
        Some(ip) => Some(ip.to_string()),
        None => config
            .value(KEY_STATION_IP)
            .and_then(|current| current.trim().parse::<IpAddr>().ok())
            .and_then(|current| replace_host_part(current, index)),
    };
    match new_ip {
        Some(ip) => {
            report.ip_updated = config.set_value(KEY_STATION_IP, ip.as_str());
            if report.ip_updated {
                info!(key = KEY_STATION_IP, value = %ip, "updated parameter");
            }
        }
        None => warn!(
            key = KEY_STATION_IP,
            index,
            "static IP not set or not indexable, leaving it untouched"
        ),
    }

    report.hostname_updated =
        apply_indexed_name(config, KEY_HOSTNAME, index, overrides.hostname.as_deref());
    report.ssid_updated = apply_indexed_name(config, KEY_AP_SSID, index, overrides.ssid.as_deref());

    if !report.any_updated() {
        return Err(ParamsError::ConfigValidation(format!(
            "none of {KEY_STATION_IP}, {KEY_HOSTNAME}, {KEY_AP_SSID} could be updated"
        )));
    }
    Ok(report)
}

/// Replaces the last octet (IPv4) or last segment (IPv6) with `index`.
fn replace_host_part(current: IpAddr, index: u32) -> Option<String> {
    match current {
        IpAddr::V4(v4) => {
            let host = u8::try_from(index).ok()?;
            let [a, b, c, _] = v4.octets();
            Some(Ipv4Addr::new(a, b, c, host).to_string())
        }
        IpAddr::V6(v6) => {
            let host = u16::try_from(index).ok()?;
            let mut segments = v6.segments();
            segments[7] = host;
            Some(Ipv6Addr::from(segments).to_string())
        }
    }
}

/// Strips trailing decimal digits from `base` and appends `index`.
#[must_use]
pub fn indexed_name(base: &str, index: u32) -> String {
    format!("{}{index}", base.trim_end_matches(|c: char| c.is_ascii_digit()))
}

fn apply_indexed_name(
    config: &mut ParamStore,
    key: &str,
    index: u32,
    explicit: Option<&str>,
) -> bool {
    let Some(current) = config.value(key) else {
        warn!(key, "parameter not present, leaving it untouched");
        return false;
    };
    let value = match explicit {
        Some(explicit) => explicit.to_string(),
        None => indexed_name(current, index),
    };
    info!(key, value = %value, "updated parameter");
    config.set_value(key, value)
}
