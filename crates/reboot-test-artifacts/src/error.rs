//! Error types for artifact access.

use std::path::PathBuf;

use thiserror::Error;

/// A result type using `ArtifactError`.
pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Errors that can occur while reading build artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The build has no package repository.
    #[error("package repository not found at {0}")]
    MissingRepository(PathBuf),

    /// The update manifest could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The update manifest is not valid JSON or is missing fields.
    #[error("malformed update manifest {path}: {reason}")]
    Manifest {
        /// The manifest path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}
