//! Behaviour shared by every `LocalStore` implementation.

use serde_json::json;
use std::sync::Arc;
use tenantry_storage::{FileStore, InMemoryStore, LocalStore, StorageError};
use tempfile::tempdir;

fn exercise(store: &dyn LocalStore) {
    assert_eq!(store.get("pending_changes").unwrap(), None);

    store.set("pending_changes", &json!([])).unwrap();
    store
        .set("properties", &json!([{"id": "p1", "name": "Elm St"}]))
        .unwrap();

    assert_eq!(
        store.keys().unwrap(),
        vec!["pending_changes".to_string(), "properties".to_string()]
    );
    assert_eq!(
        store.get("properties").unwrap(),
        Some(json!([{"id": "p1", "name": "Elm St"}]))
    );

    store.remove("pending_changes").unwrap();
    assert_eq!(store.keys().unwrap(), vec!["properties".to_string()]);

    assert!(matches!(
        store.get("../escape"),
        Err(StorageError::InvalidKey(_))
    ));
}

#[test]
fn in_memory_store_contract() {
    exercise(&InMemoryStore::new());
}

#[test]
fn file_store_contract() {
    let dir = tempdir().unwrap();
    exercise(&FileStore::open(dir.path()).unwrap());
}

#[test]
fn file_store_shared_across_threads() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(dir.path()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for n in 0..10 {
                    store.set("counter", &json!({"writer": i, "n": n})).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let last = store.get("counter").unwrap().unwrap();
    assert_eq!(last["n"], json!(9));
}
