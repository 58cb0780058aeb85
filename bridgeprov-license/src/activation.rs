//! Hardware-bound activation keys.
//!
//! The activation key identifies one physical unit. It is the standard
//! base64 encoding of a fixed little-endian record:
//!
//! ```text
//! hardware_mac: [u8; 6] | chip_id: u8 | chip_revision: u16
//! ```
//!
//! The key is stable across re-derivation for the same unit and is used
//! both as the issuance lookup key and as the license cache file stem.

use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the decoded activation record.
pub const ACTIVATION_RECORD_LEN: usize = 6 + 1 + 2;

/// Identity fields read from a connected device.
///
/// Implemented by the device-identification collaborator. A read fails with
/// [`LicenseError::DeviceCommunication`] if the device does not answer or
/// disconnects.
#[async_trait]
pub trait HardwareIdentity: Send {
    /// Factory-programmed MAC address.
    async fn read_hardware_address(&mut self) -> LicenseResult<[u8; 6]>;

    /// Image chip id of the target.
    async fn read_chip_id(&mut self) -> LicenseResult<u8>;

    /// Chip revision encoded as `major * 100 + minor`.
    async fn read_chip_revision(&mut self) -> LicenseResult<u16>;
}

/// A derived activation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationKey {
    key: String,
}

impl ActivationKey {
    /// Builds the key from raw identity fields.
    #[must_use]
    pub fn from_parts(mac: [u8; 6], chip_id: u8, chip_revision: u16) -> Self {
        let mut record = [0u8; ACTIVATION_RECORD_LEN];
        record[..6].copy_from_slice(&mac);
        record[6] = chip_id;
        record[7..].copy_from_slice(&chip_revision.to_le_bytes());
        Self {
            key: BASE64.encode(record),
        }
    }

    /// Wraps an activation key received as text (e.g. typed by an operator).
    pub fn parse(key: &str) -> LicenseResult<Self> {
        let key = key.trim();
        let decoded = BASE64
            .decode(key)
            .map_err(|e| LicenseError::MalformedLicense(format!("invalid activation key: {e}")))?;
        if decoded.len() != ACTIVATION_RECORD_LEN {
            return Err(LicenseError::MalformedLicense(format!(
                "activation key decodes to {} bytes, expected {ACTIVATION_RECORD_LEN}",
                decoded.len()
            )));
        }
        Ok(Self {
            key: key.to_string(),
        })
    }

    /// Reads the identity fields from `device` and derives the key.
    pub async fn derive(device: &mut dyn HardwareIdentity) -> LicenseResult<Self> {
        let mac = device.read_hardware_address().await?;
        let chip_id = device.read_chip_id().await?;
        let revision = device.read_chip_revision().await?;
        Ok(Self::from_parts(mac, chip_id, revision))
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Returns the key in a form usable as a file name.
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.key.replace('/', "_").replace('+', "-")
    }

    /// Decodes the identity fields back out of the key.
    #[must_use]
    pub fn parts(&self) -> Option<([u8; 6], u8, u16)> {
        let decoded = BASE64.decode(&self.key).ok()?;
        if decoded.len() != ACTIVATION_RECORD_LEN {
            return None;
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&decoded[..6]);
        Some((mac, decoded[6], u16::from_le_bytes([decoded[7], decoded[8]])))
    }
}

impl fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for ActivationKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}
