//! Session error types.
//!
//! Every library error is folded onto one of the provisioning error kinds
//! and tagged with the state the session was trying to reach.

use crate::session::SessionState;
use bridgeprov_device::DeviceError;
use bridgeprov_license::LicenseError;
use bridgeprov_params::ParamsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for session steps.
pub type SessionResult<T> = Result<T, SessionError>;

/// Provisioning error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceCommunication,
    UnsupportedHardware,
    LicenseUnavailable,
    MalformedLicense,
    SignatureInvalid,
    ConfigValidation,
    Render,
    Flash,
    /// Host-side file system or storage failure.
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeviceCommunication => "DeviceCommunicationError",
            Self::UnsupportedHardware => "UnsupportedHardware",
            Self::LicenseUnavailable => "LicenseUnavailable",
            Self::MalformedLicense => "MalformedLicense",
            Self::SignatureInvalid => "SignatureInvalid",
            Self::ConfigValidation => "ConfigValidationError",
            Self::Render => "RenderError",
            Self::Flash => "FlashError",
            Self::Storage => "StorageError",
        };
        f.write_str(name)
    }
}

/// A failed session transition.
#[derive(Debug, Error)]
#[error("{kind} while entering {state}: {message}")]
pub struct SessionError {
    /// Error classification.
    pub kind: ErrorKind,
    /// State whose entry action failed.
    pub state: SessionState,
    /// Human readable cause, surfaced verbatim from the failing component.
    pub message: String,
}

impl SessionError {
    pub fn new(kind: ErrorKind, state: SessionState, message: impl Into<String>) -> Self {
        Self {
            kind,
            state,
            message: message.into(),
        }
    }

    pub fn from_license(state: SessionState, err: LicenseError) -> Self {
        let kind = match &err {
            LicenseError::MalformedLicense(_) => ErrorKind::MalformedLicense,
            LicenseError::SignatureInvalid | LicenseError::WrongDevice { .. } => {
                ErrorKind::SignatureInvalid
            }
            LicenseError::DeviceCommunication(_) => ErrorKind::DeviceCommunication,
            LicenseError::Storage(_) | LicenseError::Io(_) | LicenseError::Serialization(_) => {
                ErrorKind::Storage
            }
            LicenseError::LicenseUnavailable(_)
            | LicenseError::Key(_)
            | LicenseError::Network(_)
            | LicenseError::IssuanceRejected { .. } => ErrorKind::LicenseUnavailable,
        };
        Self::new(kind, state, err.to_string())
    }

    pub fn from_device(state: SessionState, err: DeviceError) -> Self {
        let kind = match &err {
            DeviceError::Communication(_)
            | DeviceError::ToolOutput(_)
            | DeviceError::ApiRejected { .. } => ErrorKind::DeviceCommunication,
            DeviceError::UnsupportedHardware(_) => ErrorKind::UnsupportedHardware,
            DeviceError::Render(_) => ErrorKind::Render,
            DeviceError::Flash(_) => ErrorKind::Flash,
            DeviceError::ReleaseLayout(_) | DeviceError::Io(_) => ErrorKind::Storage,
            DeviceError::InvalidArgument(_) => ErrorKind::ConfigValidation,
        };
        Self::new(kind, state, err.to_string())
    }

    pub fn from_params(state: SessionState, err: ParamsError) -> Self {
        let kind = match &err {
            ParamsError::ConfigValidation(_) => ErrorKind::ConfigValidation,
            ParamsError::InvalidHeader(_)
            | ParamsError::InvalidRow { .. }
            | ParamsError::Csv(_)
            | ParamsError::Io(_) => ErrorKind::Storage,
        };
        Self::new(kind, state, err.to_string())
    }

    pub fn storage(state: SessionState, err: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Storage, state, err.to_string())
    }
}
