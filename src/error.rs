//! Error types for the curation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can end a stage or the whole run.
///
/// Per-sample problems (unreadable files, decode failures, failed
/// augmentations) are recorded in the stage manifests instead and never
/// surface through this type.
#[derive(Debug, Error)]
pub enum CurationError {
    /// Invalid option value, caught before any stage runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input directory is missing or holds no class directories.
    #[error("Input directory '{0}' contains no class directories")]
    EmptyInput(PathBuf),

    /// Error reading or writing a file or directory.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage manifest could not be persisted.
    #[error("Failed to write manifest '{path}': {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image data could not be decoded.
    #[error("Failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Image could not be encoded to the output format.
    #[error("Encode error: {0}")]
    Encode(#[from] image::ImageError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CurationError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CurationError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for curation operations.
pub type Result<T> = std::result::Result<T, CurationError>;
