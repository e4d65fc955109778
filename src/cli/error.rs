//! CLI error types and conversions

use std::path::PathBuf;

use crate::batch::LookupError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Lookup error
    #[error("lookup error: {0}")]
    LookupError(#[from] LookupError),

    /// JSON encoding error
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File could not be read or written
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Metrics exporter could not start
    #[error("metrics error: {0}")]
    MetricsError(String),
}
