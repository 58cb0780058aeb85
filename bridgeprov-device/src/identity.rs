//! Hardware identity as reported by the flashing tool.

use crate::chip::{chip_id_for_name, SupportedChip};
use crate::error::{DeviceError, DeviceResult};
use async_trait::async_trait;
use bridgeprov_license::{HardwareIdentity, LicenseResult};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;

/// Identity fields of one connected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipIdentity {
    /// Chip name as printed by the tool, e.g. `ESP32-C3`.
    pub chip_name: String,
    /// Image chip id, if the name is known.
    pub chip_id: Option<u8>,
    /// Revision encoded as `major * 100 + minor`.
    pub revision: u16,
    /// Factory MAC address.
    pub mac: [u8; 6],
}

impl ChipIdentity {
    /// Returns the chip if it is in the supported set.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnsupportedHardware`] otherwise.
    pub fn supported_chip(&self) -> DeviceResult<SupportedChip> {
        match self.chip_id {
            Some(id) => SupportedChip::require(id),
            None => Err(DeviceError::UnsupportedHardware(format!(
                "unknown chip '{}'",
                self.chip_name
            ))),
        }
    }

    /// MAC address in `aa:bb:cc:dd:ee:ff` form.
    #[must_use]
    pub fn mac_string(&self) -> String {
        let mut out = String::with_capacity(17);
        for (i, byte) in self.mac.iter().enumerate() {
            if i > 0 {
                out.push(':');
            }
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

/// Identity reads come from a single probe, so they cannot fail halfway.
#[async_trait]
impl HardwareIdentity for ChipIdentity {
    async fn read_hardware_address(&mut self) -> LicenseResult<[u8; 6]> {
        Ok(self.mac)
    }

    async fn read_chip_id(&mut self) -> LicenseResult<u8> {
        self.chip_id.ok_or_else(|| {
            bridgeprov_license::LicenseError::DeviceCommunication(format!(
                "unknown chip '{}'",
                self.chip_name
            ))
        })
    }

    async fn read_chip_revision(&mut self) -> LicenseResult<u16> {
        Ok(self.revision)
    }
}

static CHIP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Chip (?:is|type:)\s+([A-Za-z0-9-]+)").expect("valid chip pattern")
});

static REVISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"revision:?\s+v?(\d+)(?:\.(\d+))?").expect("valid revision pattern")
});

static MAC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*MAC:\s+((?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2})").expect("valid MAC pattern")
});

/// Parses the output of the tool's MAC-read command.
///
/// Both `Chip is ESP32-C3 (QFN32) (revision v0.4)` and the newer
/// `Chip type: ESP32-C3 (QFN32) (revision v0.4)` forms are recognised.
/// A bare `revision 3` is read as minor revision 3.
///
/// # Errors
///
/// Returns [`DeviceError::ToolOutput`] if the chip, revision or MAC line is
/// missing.
pub fn parse_identity(output: &str) -> DeviceResult<ChipIdentity> {
    let chip_line = CHIP_LINE
        .captures(output)
        .ok_or_else(|| DeviceError::ToolOutput("no chip line in tool output".to_string()))?;
    let chip_name = chip_line[1].to_string();

    let revision = REVISION
        .captures(output)
        .ok_or_else(|| DeviceError::ToolOutput("no chip revision in tool output".to_string()))?;
    let first: u16 = revision[1]
        .parse()
        .map_err(|_| DeviceError::ToolOutput(format!("invalid revision '{}'", &revision[0])))?;
    let revision = match revision.get(2) {
        Some(minor) => {
            let minor: u16 = minor.as_str().parse().map_err(|_| {
                DeviceError::ToolOutput(format!("invalid revision '{}'", &revision[0]))
            })?;
            first.saturating_mul(100).saturating_add(minor)
        }
        None => first,
    };

    let mac_text = MAC_LINE
        .captures(output)
        .ok_or_else(|| DeviceError::ToolOutput("no MAC line in tool output".to_string()))?;
    let mut mac = [0u8; 6];
    for (slot, part) in mac.iter_mut().zip(mac_text[1].split(':')) {
        *slot = u8::from_str_radix(part, 16)
            .map_err(|_| DeviceError::ToolOutput(format!("invalid MAC '{}'", &mac_text[1])))?;
    }

    Ok(ChipIdentity {
        chip_id: chip_id_for_name(&chip_name),
        chip_name,
        revision,
        mac,
    })
}
