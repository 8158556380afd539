//! In-memory local store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, LocalStore};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory local store.
///
/// This store keeps every document in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Sessions that don't need durability across restarts
///
/// Writes can be made to fail on demand with [`InMemoryStore::set_fail_writes`],
/// which is how the engine's persistence-failure policy is exercised.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use tenantry_storage::{InMemoryStore, LocalStore};
///
/// let store = InMemoryStore::new();
/// assert_eq!(store.get("tenants").unwrap(), None);
/// store.set("tenants", &json!([])).unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["tenants".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    documents: RwLock<BTreeMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with documents.
    ///
    /// Useful for simulating a restart with existing state.
    #[must_use]
    pub fn with_documents(documents: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            documents: RwLock::new(documents.into_iter().collect()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent `set` and `remove` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of every stored document.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.documents.read().clone()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

impl LocalStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        validate_key(key)?;
        Ok(self.documents.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.documents.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.documents.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.documents.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_get_missing() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("properties").unwrap(), None);
    }

    #[test]
    fn memory_set_replaces_document() {
        let store = InMemoryStore::new();
        store.set("properties", &json!([{"id": "p1"}])).unwrap();
        store.set("properties", &json!([{"id": "p2"}])).unwrap();

        assert_eq!(store.get("properties").unwrap(), Some(json!([{"id": "p2"}])));
        assert_eq!(store.keys().unwrap().len(), 1);
    }

    #[test]
    fn memory_remove() {
        let store = InMemoryStore::new();
        store.set("tenants", &json!([])).unwrap();
        store.remove("tenants").unwrap();
        store.remove("tenants").unwrap();
        assert_eq!(store.get("tenants").unwrap(), None);
    }

    #[test]
    fn memory_failing_writes_keep_old_document() {
        let store = InMemoryStore::new();
        store.set("tenants", &json!([1])).unwrap();

        store.set_fail_writes(true);
        let result = store.set("tenants", &json!([2]));
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert_eq!(store.get("tenants").unwrap(), Some(json!([1])));

        store.set_fail_writes(false);
        store.set("tenants", &json!([2])).unwrap();
        assert_eq!(store.get("tenants").unwrap(), Some(json!([2])));
    }

    #[test]
    fn memory_with_documents() {
        let store = InMemoryStore::with_documents([("a".to_string(), json!(1))]);
        assert_eq!(store.snapshot().get("a"), Some(&json!(1)));
    }

    #[test]
    fn memory_rejects_invalid_key() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.set("a/b", &json!(null)),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
