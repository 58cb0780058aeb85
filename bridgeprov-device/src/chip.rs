//! Chip identification and the supported hardware set.

use crate::error::{DeviceError, DeviceResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known chip names and their image chip ids.
const CHIP_IDS: &[(&str, u8)] = &[
    ("ESP32", 0),
    ("ESP32-S2", 2),
    ("ESP32-C3", 5),
    ("ESP32-S3", 9),
    ("ESP32-C2", 12),
    ("ESP32-C6", 13),
    ("ESP32-H2", 16),
    ("ESP32-P4", 18),
    ("ESP32-C61", 20),
    ("ESP32-C5", 23),
];

/// Maps a chip name as printed by the flashing tool to its image chip id.
///
/// Package suffixes such as `ESP32-D0WD-V3` are folded onto their family.
#[must_use]
pub fn chip_id_for_name(name: &str) -> Option<u8> {
    let name = name.trim().to_ascii_uppercase();
    if let Some((_, id)) = CHIP_IDS.iter().find(|(known, _)| *known == name) {
        return Some(*id);
    }
    if name.starts_with("ESP32-D") || name.starts_with("ESP32-U") || name.starts_with("ESP32-PICO") {
        return Some(0);
    }
    None
}

/// Returns the canonical name of a chip id.
#[must_use]
pub fn chip_name(chip_id: u8) -> Option<&'static str> {
    CHIP_IDS
        .iter()
        .find(|(_, id)| *id == chip_id)
        .map(|(name, _)| *name)
}

/// Chips this tool can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedChip {
    Esp32C3,
    Esp32C6,
    Esp32C5,
}

impl SupportedChip {
    /// All supported chips.
    pub const ALL: [SupportedChip; 3] = [Self::Esp32C3, Self::Esp32C6, Self::Esp32C5];

    /// Looks up a chip id in the supported set.
    #[must_use]
    pub fn from_chip_id(chip_id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.chip_id() == chip_id)
    }

    /// Like [`SupportedChip::from_chip_id`] but fails with
    /// [`DeviceError::UnsupportedHardware`].
    pub fn require(chip_id: u8) -> DeviceResult<Self> {
        Self::from_chip_id(chip_id).ok_or_else(|| {
            DeviceError::UnsupportedHardware(format!(
                "chip id {chip_id} ({})",
                chip_name(chip_id).unwrap_or("unknown")
            ))
        })
    }

    /// Image chip id.
    #[must_use]
    pub fn chip_id(&self) -> u8 {
        match self {
            Self::Esp32C3 => 5,
            Self::Esp32C6 => 13,
            Self::Esp32C5 => 23,
        }
    }

    /// Name as printed by the flashing tool.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Esp32C3 => "ESP32-C3",
            Self::Esp32C6 => "ESP32-C6",
            Self::Esp32C5 => "ESP32-C5",
        }
    }

    /// Sub-folder of a firmware release holding this chip's images.
    #[must_use]
    pub fn release_folder(&self) -> &'static str {
        match self {
            Self::Esp32C3 => "esp32c3_generic",
            Self::Esp32C6 => "esp32c6_generic",
            Self::Esp32C5 => "esp32c5_generic",
        }
    }
}

impl fmt::Display for SupportedChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
