//! Error types for gateway toolkit operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or saving a sandbox tenant.
#[derive(Debug, Error)]
pub enum Error {
    /// Snapshot file could not be read or written
    #[error("snapshot {path}: {source}")]
    Io {
        /// Path of the snapshot file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Snapshot file is not a valid tenant
    #[error("snapshot {path} is not a valid tenant: {source}")]
    Json {
        /// Path of the snapshot file
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },
}

/// Result type for gateway toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;
