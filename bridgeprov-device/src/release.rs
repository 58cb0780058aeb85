//! Firmware release layout and the flash address map.
//!
//! A release directory contains the release parameter template plus one
//! sub-folder per supported chip. Each chip folder holds the firmware
//! images and a `flash_args.txt` listing `<address> <image>` pairs.

use crate::chip::SupportedChip;
use crate::error::{DeviceError, DeviceResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Release parameter template file name.
pub const RELEASE_TEMPLATE_FILE: &str = "db_show_params.csv";
/// Per-chip flash layout file name.
pub const FLASH_ARGS_FILE: &str = "flash_args.txt";
/// Flash address of the configuration partition.
pub const CONFIG_PARTITION_ADDRESS: u32 = 0x9000;
/// Size of the configuration partition in bytes.
pub const CONFIG_PARTITION_SIZE: u32 = 0x6000;

/// A validated firmware release directory.
#[derive(Debug, Clone)]
pub struct Release {
    dir: PathBuf,
    chips: Vec<SupportedChip>,
}

impl Release {
    /// Opens `dir` and checks it is a usable release.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ReleaseLayout`] if the release template is
    /// missing or no supported chip folder has a `flash_args.txt`.
    pub fn open(dir: impl Into<PathBuf>) -> DeviceResult<Self> {
        let dir = dir.into();
        let template = dir.join(RELEASE_TEMPLATE_FILE);
        if !template.is_file() {
            return Err(DeviceError::ReleaseLayout(format!(
                "release template {} not found",
                template.display()
            )));
        }

        let chips: Vec<SupportedChip> = SupportedChip::ALL
            .into_iter()
            .filter(|chip| dir.join(chip.release_folder()).join(FLASH_ARGS_FILE).is_file())
            .collect();
        if chips.is_empty() {
            return Err(DeviceError::ReleaseLayout(format!(
                "{} contains no chip folder with {FLASH_ARGS_FILE}",
                dir.display()
            )));
        }
        debug!(dir = %dir.display(), ?chips, "opened release");
        Ok(Self { dir, chips })
    }

    /// Release root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the release parameter template.
    #[must_use]
    pub fn template_path(&self) -> PathBuf {
        self.dir.join(RELEASE_TEMPLATE_FILE)
    }

    /// Chips the release ships images for.
    #[must_use]
    pub fn chips(&self) -> &[SupportedChip] {
        &self.chips
    }

    /// Folder holding the images for `chip`.
    #[must_use]
    pub fn chip_dir(&self, chip: SupportedChip) -> PathBuf {
        self.dir.join(chip.release_folder())
    }

    /// Builds the complete flash map for `chip` with `config_binary` at the
    /// configuration partition address.
    pub fn address_map(&self, chip: SupportedChip, config_binary: &Path) -> DeviceResult<FlashMap> {
        let mut map = FlashMap::from_flash_args(&self.chip_dir(chip))?;
        map.insert_config(config_binary);
        Ok(map)
    }
}

/// Mapping from absolute flash address to image path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashMap {
    entries: BTreeMap<u32, PathBuf>,
}

impl FlashMap {
    /// Reads `<chip_dir>/flash_args.txt`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ReleaseLayout`] if the file is missing or has
    /// a malformed line.
    pub fn from_flash_args(chip_dir: &Path) -> DeviceResult<Self> {
        let path = chip_dir.join(FLASH_ARGS_FILE);
        let text = fs::read_to_string(&path).map_err(|e| {
            DeviceError::ReleaseLayout(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text, chip_dir)
    }

    /// Parses flash arguments, resolving image names against `chip_dir`.
    ///
    /// Option lines (`--flash_mode dio ...`) and blank lines are skipped.
    /// Only the file name of each image is kept.
    pub fn parse(text: &str, chip_dir: &Path) -> DeviceResult<Self> {
        let mut entries = BTreeMap::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("--") {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(address), Some(image)) = (parts.next(), parts.next()) else {
                return Err(DeviceError::ReleaseLayout(format!(
                    "{FLASH_ARGS_FILE} line {}: expected '<address> <image>'",
                    n + 1
                )));
            };
            let address = parse_address(address).ok_or_else(|| {
                DeviceError::ReleaseLayout(format!(
                    "{FLASH_ARGS_FILE} line {}: invalid address '{address}'",
                    n + 1
                ))
            })?;
            let file_name = Path::new(image).file_name().ok_or_else(|| {
                DeviceError::ReleaseLayout(format!(
                    "{FLASH_ARGS_FILE} line {}: invalid image path '{image}'",
                    n + 1
                ))
            })?;
            entries.insert(address, chip_dir.join(file_name));
        }
        Ok(Self { entries })
    }

    /// Places the configuration binary at [`CONFIG_PARTITION_ADDRESS`],
    /// replacing any release image there.
    pub fn insert_config(&mut self, config_binary: &Path) {
        if let Some(previous) = self
            .entries
            .insert(CONFIG_PARTITION_ADDRESS, config_binary.to_path_buf())
        {
            warn!(
                image = %previous.display(),
                "release image at configuration address replaced"
            );
        }
    }

    /// Entries in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Path)> {
        self.entries.iter().map(|(a, p)| (*a, p.as_path()))
    }

    /// Image at `address`, if any.
    #[must_use]
    pub fn get(&self, address: u32) -> Option<&Path> {
        self.entries.get(&address).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattens the map into `0x1000 a.bin 0x9000 b.bin ...` arguments.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(address, path)| {
                [format!("{address:#x}"), path.display().to_string()]
            })
            .collect()
    }
}

fn parse_address(text: &str) -> Option<u32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
