//! Device-side plumbing for fleet provisioning.
//!
//! This crate handles:
//! - The supported chip set and chip identification
//! - Firmware release layout and the flash address map
//! - Serial port discovery and exclusive port claims
//! - Adapters for the external flashing, partition generator and partition
//!   decoder tools
//! - The HTTP API of devices already running the firmware (`online`
//!   feature)
//!
//! The tool adapters sit behind small traits ([`IdentityProbe`],
//! [`BinaryRenderer`], [`Flasher`] and the license crate's
//! `PartitionReader`) so provisioning logic can run against doubles.

#[cfg(feature = "online")]
mod api;
mod chip;
mod error;
mod esptool;
mod identity;
mod nvs_dump;
mod ports;
mod release;
mod render;
mod tool;

pub use chip::{chip_id_for_name, chip_name, SupportedChip};
pub use error::{DeviceError, DeviceResult};
pub use esptool::{Esptool, Flasher, IdentityProbe, DEFAULT_BAUD};
pub use identity::{parse_identity, ChipIdentity};
pub use nvs_dump::{parse_nvs_json, NvsToolReader, PARTITION_DUMP_FILE};
pub use ports::{diff_ports, PortChanges, PortClaim, PortClaims, PortScanner, SystemPorts};
pub use release::{
    FlashMap, Release, CONFIG_PARTITION_ADDRESS, CONFIG_PARTITION_SIZE, FLASH_ARGS_FILE,
    RELEASE_TEMPLATE_FILE,
};
pub use render::{BinaryRenderer, NvsPartitionGen};
pub use tool::{ToolCommand, ToolOutput, DEFAULT_TOOL_TIMEOUT};

#[cfg(feature = "online")]
pub use api::{DeviceApi, StaticIp, UdpClient, DEFAULT_API_TIMEOUT};
