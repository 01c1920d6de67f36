//! Error taxonomy for the batch engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by batch operations.
///
/// Per-job executor failures are not represented here: they are recorded on
/// the job itself and only show up through status queries.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Bad input path, missing manifest, or invalid parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed CSV content or an unwritable export destination.
    #[error("File processing error: {0}")]
    FileProcessing(String),

    /// Path traversal or size limit violation.
    #[error("Security error: {0}")]
    Security(String),

    /// Invariant violation inside the engine.
    #[error("Batch engine error: {0}")]
    Engine(String),

    /// Manifest I/O failure.
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BatchError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable label for exit-code mapping and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::FileProcessing(_) => "file_processing",
            Self::Security(_) => "security",
            Self::Engine(_) => "engine",
            Self::Io { .. } => "io",
        }
    }
}

impl From<ConfigError> for BatchError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
