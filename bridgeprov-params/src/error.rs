//! Error types for parameter files.

use thiserror::Error;

/// Result type for parameter operations.
pub type ParamsResult<T> = Result<T, ParamsError>;

/// Errors that can occur while loading, merging or rewriting parameter files.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// The header line is missing or lacks a required column.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A data row could not be interpreted.
    #[error("invalid row {line}: {reason}")]
    InvalidRow {
        /// 1-based line number in the source file.
        line: u64,
        /// What was wrong with the row.
        reason: String,
    },

    /// The configuration cannot be provisioned as requested (bad override,
    /// nothing updated by index assignment, ...).
    #[error("configuration validation failed: {0}")]
    ConfigValidation(String),

    /// CSV reader/writer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
