//! Local store trait definition.

use crate::error::{StorageError, StorageResult};
use serde_json::Value;

/// A durable key/value store holding one JSON document per key.
///
/// # Invariants
///
/// - `set` replaces the whole document; there is no partial-write state
///   visible to `get`
/// - `get` after a successful `set` returns the same document, including
///   after a process restart for durable implementations
/// - `remove` of a missing key is not an error
/// - Stores must be `Send + Sync` for shared access across tasks
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait LocalStore: Send + Sync {
    /// Reads the document stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Replaces the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be durably written.
    fn set(&self, key: &str, value: &Value) -> StorageResult<()>;

    /// Removes the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing document cannot be removed.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists every key that currently holds a document, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be enumerated.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Checks that `key` only uses `[A-Za-z0-9_-]` and is not empty.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] otherwise.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_known_keys() {
        assert!(validate_key("pending_changes").is_ok());
        assert!(validate_key("energy-bills").is_ok());
        assert!(validate_key("Tenants2").is_ok());
    }

    #[test]
    fn rejects_path_like_keys() {
        assert!(matches!(
            validate_key("../etc"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(validate_key("").is_err());
        assert!(validate_key("a b").is_err());
        assert!(validate_key(".lock").is_err());
    }
}
