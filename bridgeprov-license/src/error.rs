//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Bytes are too short or otherwise structurally not a license record.
    #[error("malformed license: {0}")]
    MalformedLicense(String),

    /// Record is well formed but its signature does not verify.
    #[error("license signature invalid")]
    SignatureInvalid,

    /// Record verifies but was issued to different hardware.
    #[error("license belongs to activation key {found}, expected {expected}")]
    WrongDevice {
        /// Activation key the record was issued to.
        found: String,
        /// Activation key of the device being provisioned.
        expected: String,
    },

    /// Every acquisition strategy was exhausted.
    #[error("no valid license available: {0}")]
    LicenseUnavailable(String),

    /// Reading identity or storage from the device failed.
    #[error("device communication failed: {0}")]
    DeviceCommunication(String),

    /// Trusted or signing key material could not be loaded.
    #[error("invalid key material: {0}")]
    Key(String),

    /// Network error during remote issuance.
    #[error("network error: {0}")]
    Network(String),

    /// Issuance service answered but refused the request.
    #[error("issuance rejected with status {status}: {body}")]
    IssuanceRejected {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
