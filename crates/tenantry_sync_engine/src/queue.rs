//! Persistence of the pending queue document.

use crate::error::SyncResult;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tenantry_storage::LocalStore;
use tenantry_sync_protocol::PendingQueue;

/// Reads and rewrites the pending queue stored under one key.
///
/// The queue is never cached: every call goes back to the local store.
/// Read-modify-write sections run under a lock shared by all clones, so
/// the recorder and the engine cannot interleave their rewrites.
#[derive(Clone)]
pub struct QueueStore {
    store: Arc<dyn LocalStore>,
    key: String,
    write_lock: Arc<Mutex<()>>,
}

impl QueueStore {
    /// Creates a queue store over `store` using `key`.
    pub fn new(store: Arc<dyn LocalStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the queue key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the queue.
    pub fn load(&self) -> SyncResult<PendingQueue> {
        match self.store.get(&self.key)? {
            Some(value) => Ok(PendingQueue::from_value(value)?),
            None => Ok(PendingQueue::new()),
        }
    }

    /// Loads the queue, applies `f` and writes the result back as one unit.
    ///
    /// Nothing is written if loading fails.
    pub fn update<R>(&self, f: impl FnOnce(&mut PendingQueue) -> R) -> SyncResult<R> {
        let _guard = self.write_lock.lock();
        let mut queue = self.load()?;
        let result = f(&mut queue);
        self.store.set(&self.key, &queue.to_value()?)?;
        Ok(result)
    }

    /// Replaces the queue with an empty one, returning how many entries
    /// were dropped.
    pub fn clear(&self) -> SyncResult<usize> {
        let _guard = self.write_lock.lock();
        let dropped = self.load().map(|q| q.len()).unwrap_or(0);
        self.store.set(&self.key, &Value::Array(Vec::new()))?;
        Ok(dropped)
    }

    /// Re-reads the number of pending entries. Unreadable queues count as
    /// zero and are logged.
    pub fn pending_count(&self) -> usize {
        match self.load() {
            Ok(queue) => queue.len(),
            Err(err) => {
                tracing::error!(key = %self.key, error = %err, "failed to read pending queue");
                0
            }
        }
    }
}
