//! Error types for buildwatch.
//!
//! Library crates use [`BuildwatchError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all buildwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum BuildwatchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// CI-build service call failure (transport, HTTP status, or decode).
    #[error("ci service error: {0}")]
    CiService(String),

    /// Log service call failure (transport, HTTP status, or decode).
    #[error("log service error: {0}")]
    LogService(String),

    /// Failure writing or reading back the persisted log report.
    #[error("report I/O error at {path:?}: {source}")]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mail composition or SMTP transport failure.
    #[error("smtp error: {0}")]
    Smtp(String),

    /// Data validation error (bad address, malformed response, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BuildwatchError>;

impl BuildwatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with the report path for context.
    pub fn report(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Report {
            path: path.into(),
            source,
        }
    }
}
