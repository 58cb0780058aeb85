//! Hardware-bound licensing for fleet provisioning.
//!
//! This crate handles:
//! - The license record wire format and RSA-PSS signature verification
//! - Deriving activation keys from a device's hardware identity
//! - The local license cache
//! - Recovering a license already installed on a device
//! - Remote issuance over HTTPS (`online` feature)
//! - The ordered acquisition chain that ties the above together
//!
//! # Loss prevention
//!
//! A device that already holds a valid license is never reconfigured unless
//! a valid replacement has been secured first. [`LicenseAcquirer::acquire`]
//! only returns records that verify against the device's activation key and
//! that have been written to the cache.

mod acquire;
mod activation;
mod cache;
mod error;
mod issuer;
mod nvs;
mod record;

pub use acquire::{
    AcquiredLicense, Attempt, LicenseAcquirer, LicenseRecovery, LicenseSource, PartitionRecovery,
};
pub use activation::{ActivationKey, HardwareIdentity, ACTIVATION_RECORD_LEN};
pub use cache::{CachedLicense, LicenseCache, LICENSE_EXTENSION};
pub use error::{LicenseError, LicenseResult};
pub use issuer::{
    content_disposition_filename, mask_token, IssuanceRequest, IssuedLicense, IssuerConfig,
    RemoteIssuer,
};
pub use nvs::{
    extract_license_blob, NvsEntry, NvsEntryKind, NvsValue, PartitionReader, LICENSE_BLOB_KEY,
    LICENSE_NAMESPACE, NAMESPACE_DIRECTORY,
};
pub use record::{
    encode, LicenseInfo, LicenseRecord, LicenseSigner, LicenseType, LicenseVerifier, Rejection,
    Verification, SIGNATURE_LEN, TAIL_LEN,
};

#[cfg(feature = "online")]
pub use issuer::HttpIssuer;
