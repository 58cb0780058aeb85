//! Error types for device access and external tools.

use thiserror::Error;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors raised while talking to a device or running a flashing tool.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Serial I/O or handshake with the device failed.
    #[error("device communication failed: {0}")]
    Communication(String),

    /// The device reported a chip outside the supported set.
    #[error("unsupported hardware: {0}")]
    UnsupportedHardware(String),

    /// The configuration binary could not be generated.
    #[error("binary rendering failed: {0}")]
    Render(String),

    /// Writing images to the device failed.
    #[error("flashing failed: {0}")]
    Flash(String),

    /// The firmware release directory is incomplete.
    #[error("invalid release layout: {0}")]
    ReleaseLayout(String),

    /// A request argument was rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device's HTTP API answered with a non-success status.
    #[error("device API rejected the request ({status}): {body}")]
    ApiRejected { status: u16, body: String },

    /// A tool ran but its output could not be interpreted.
    #[error("unexpected tool output: {0}")]
    ToolOutput(String),

    /// IO error (file system, process spawn).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
