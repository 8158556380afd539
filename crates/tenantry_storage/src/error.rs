//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored document could not be encoded or decoded.
    #[error("JSON error for key {key:?}: {source}")]
    Json {
        /// The key whose document failed.
        key: String,
        /// The underlying serde_json error.
        source: serde_json::Error,
    },

    /// The key contains characters that cannot be mapped to a file name.
    #[error("invalid key {0:?}: only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidKey(String),

    /// Another process holds the store directory.
    #[error("store at {0:?} is locked by another process")]
    Locked(PathBuf),

    /// The store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
