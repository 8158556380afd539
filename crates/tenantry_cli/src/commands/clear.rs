//! Clear command implementation.

use std::path::Path;
use std::sync::Arc;
use tenantry_storage::FileStore;
use tenantry_sync_engine::{QueueStore, DEFAULT_QUEUE_KEY};

/// Runs the clear command.
///
/// Takes the store lock, so it fails while a client holds the store.
pub fn run(path: &Path, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dropped = clear(path, confirmed)?;
    println!("Discarded {dropped} pending change(s)");
    Ok(())
}

/// Drops the queue and returns how many changes were discarded.
pub fn clear(path: &Path, confirmed: bool) -> Result<usize, Box<dyn std::error::Error>> {
    if !confirmed {
        return Err("refusing to discard pending changes without --yes".into());
    }

    let store = Arc::new(FileStore::open(path)?);
    let dropped = QueueStore::new(store, DEFAULT_QUEUE_KEY).clear()?;
    tracing::warn!(dropped, path = %path.display(), "pending changes discarded");
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenantry_storage::LocalStore;
    use tenantry_sync_protocol::{EntityType, Operation, PendingChange, PendingQueue};

    fn seed(path: &Path) {
        let store = FileStore::open(path).unwrap();
        let mut queue = PendingQueue::new();
        queue.enqueue(PendingChange::new(
            Operation::Delete,
            EntityType::WaterBill,
            json!({"id": "w1"}),
            "w1",
        ));
        store.set(DEFAULT_QUEUE_KEY, &queue.to_value().unwrap()).unwrap();
    }

    #[test]
    fn refuses_without_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        assert!(clear(dir.path(), false).is_err());
        let store = FileStore::open_unlocked(dir.path()).unwrap();
        assert_eq!(
            store.get(DEFAULT_QUEUE_KEY).unwrap().unwrap().as_array().unwrap().len(),
            1
        );
    }

    #[test]
    fn clears_when_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        assert_eq!(clear(dir.path(), true).unwrap(), 1);
        assert_eq!(clear(dir.path(), true).unwrap(), 0);
    }

    #[test]
    fn fails_while_store_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let _held = FileStore::open(dir.path()).unwrap();
        assert!(clear(dir.path(), true).is_err());
    }
}
