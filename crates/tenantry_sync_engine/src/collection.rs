//! Offline-aware entity collections.

use crate::connectivity::ConnectivityMonitor;
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::recorder::{ChangeRecorder, Recorded};
use crate::remote::RemoteOperations;
use parking_lot::RwLock;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tenantry_storage::LocalStore;
use tenantry_sync_protocol::{
    is_provisional, provisional_id, record_id_of, EntityType, Operation,
};

/// How a write reached (or did not reach) the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The backend confirmed the write.
    Confirmed,
    /// The write was queued for a later sync cycle.
    Queued(Recorded),
}

/// A local snapshot of one entity collection that stays usable offline.
///
/// Writes are applied to the snapshot first so the UI reflects them at
/// once. The backend is called only when the monitor reports online, the
/// record id is not provisional and no change for the record is queued;
/// everything else goes to the change recorder.
///
/// The snapshot is persisted as one JSON array under the entity's
/// collection key. A failed snapshot write is logged and the in-memory copy
/// keeps the change for the rest of the session.
pub struct Collection {
    entity_type: EntityType,
    store: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteOperations>>,
    recorder: ChangeRecorder,
    monitor: Arc<ConnectivityMonitor>,
    request_timeout: Duration,
    cache: RwLock<Option<Vec<Value>>>,
}

impl Collection {
    /// Creates a collection handle.
    pub fn new(
        entity_type: EntityType,
        store: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteOperations>>,
        recorder: ChangeRecorder,
        monitor: Arc<ConnectivityMonitor>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            entity_type,
            store,
            remote,
            recorder,
            monitor,
            request_timeout,
            cache: RwLock::new(None),
        }
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Returns every record in the snapshot.
    pub fn list(&self) -> Vec<Value> {
        self.with_records(|records| records.clone())
    }

    /// Returns one record.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.with_records(|records| records.iter().find(|r| has_id(r, id)).cloned())
    }

    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        self.with_records(|records| records.len())
    }

    /// Returns true if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a record. A missing `id` is filled with a provisional one.
    ///
    /// Returns the stored record (carrying the backend id when the backend
    /// confirmed it) and how the write was delivered.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateRecord`] if the snapshot already holds
    /// a record with the payload's `id`.
    pub async fn create(&self, mut payload: Value) -> SyncResult<(Value, WriteOutcome)> {
        if !payload.is_object() {
            return Err(SyncError::InvalidPayload {
                entity: self.entity_type,
            });
        }
        let local_id = match record_id_of(&payload) {
            Some(id) => id,
            None => {
                let id = provisional_id();
                payload["id"] = Value::String(id.clone());
                id
            }
        };

        let inserted = self.mutate(|records| {
            if records.iter().any(|r| has_id(r, &local_id)) {
                return false;
            }
            records.push(payload.clone());
            true
        });
        if !inserted {
            return Err(SyncError::DuplicateRecord {
                entity: self.entity_type,
                id: local_id,
            });
        }

        if let Some(remote) = self.remote_for(&local_id) {
            match self.call(remote.create(&payload)).await {
                Ok(stored) => {
                    self.mutate(|records| replace(records, &local_id, stored.clone()));
                    return Ok((stored, WriteOutcome::Confirmed));
                }
                Err(err) => self.log_fallback(Operation::Create, &local_id, &err),
            }
        }

        let recorded = self
            .recorder
            .record(Operation::Create, self.entity_type, payload.clone());
        Ok((payload, WriteOutcome::Queued(recorded)))
    }

    /// Replaces the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RecordNotFound`] if the snapshot has no such record.
    pub async fn update(&self, id: &str, mut payload: Value) -> SyncResult<WriteOutcome> {
        let map = payload
            .as_object_mut()
            .ok_or(SyncError::InvalidPayload {
                entity: self.entity_type,
            })?;
        map.insert("id".into(), Value::String(id.to_string()));

        let found = self.mutate(|records| replace(records, id, payload.clone()));
        if !found {
            return Err(SyncError::RecordNotFound {
                entity: self.entity_type,
                id: id.to_string(),
            });
        }

        if let Some(remote) = self.remote_for(id) {
            match self.call(remote.update(id, &payload)).await {
                Ok(_) => return Ok(WriteOutcome::Confirmed),
                Err(err) => self.log_fallback(Operation::Update, id, &err),
            }
        }

        Ok(WriteOutcome::Queued(self.recorder.record(
            Operation::Update,
            self.entity_type,
            payload,
        )))
    }

    /// Deletes the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RecordNotFound`] if the snapshot has no such record.
    pub async fn delete(&self, id: &str) -> SyncResult<WriteOutcome> {
        let found = self.mutate(|records| {
            let before = records.len();
            records.retain(|r| !has_id(r, id));
            records.len() != before
        });
        if !found {
            return Err(SyncError::RecordNotFound {
                entity: self.entity_type,
                id: id.to_string(),
            });
        }

        if let Some(remote) = self.remote_for(id) {
            match self.call(remote.delete(id)).await {
                Ok(()) => return Ok(WriteOutcome::Confirmed),
                Err(err) => self.log_fallback(Operation::Delete, id, &err),
            }
        }

        Ok(WriteOutcome::Queued(self.recorder.record(
            Operation::Delete,
            self.entity_type,
            serde_json::json!({ "id": id }),
        )))
    }

    /// Replaces the whole snapshot, e.g. after a refetch from the backend.
    pub fn replace_all(&self, records: Vec<Value>) {
        self.mutate(|current| *current = records);
    }

    fn remote_for(&self, id: &str) -> Option<Arc<dyn RemoteOperations>> {
        // The backend has never seen a provisional id; those go through
        // the queue so a pending create is delivered first. A record with
        // queued changes goes through the queue too, so the new change
        // replaces the stale one instead of being overwritten by its replay.
        if is_provisional(id)
            || !self.monitor.is_online()
            || self.recorder.has_pending(self.entity_type, id)
        {
            return None;
        }
        self.remote.clone()
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.request_timeout)))
    }

    fn log_fallback(&self, operation: Operation, id: &str, err: &RemoteError) {
        tracing::warn!(
            entity_type = %self.entity_type,
            %operation,
            record_id = id,
            error = %err,
            "remote write failed, queueing change"
        );
    }

    fn with_records<R>(&self, f: impl FnOnce(&Vec<Value>) -> R) -> R {
        self.ensure_loaded();
        let cache = self.cache.read();
        let empty = Vec::new();
        let records = cache.as_ref().unwrap_or(&empty);
        f(records)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        self.ensure_loaded();
        let (result, snapshot) = {
            let mut cache = self.cache.write();
            let records = cache.get_or_insert_with(Vec::new);
            let result = f(records);
            (result, Value::Array(records.clone()))
        };
        if let Err(err) = self.store.set(self.entity_type.collection_key(), &snapshot) {
            tracing::error!(
                entity_type = %self.entity_type,
                error = %err,
                "failed to persist collection snapshot"
            );
        }
        result
    }

    fn ensure_loaded(&self) {
        if self.cache.read().is_some() {
            return;
        }
        let key = self.entity_type.collection_key();
        let records = match self.store.get(key) {
            Ok(Some(Value::Array(records))) => records,
            Ok(Some(_)) => {
                tracing::warn!(key, "collection document is not an array, starting empty");
                Vec::new()
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::error!(key, error = %err, "failed to load collection, starting empty");
                Vec::new()
            }
        };
        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = Some(records);
        }
    }
}

fn has_id(record: &Value, id: &str) -> bool {
    record_id_of(record).as_deref() == Some(id)
}

fn replace(records: &mut [Value], id: &str, record: Value) -> bool {
    match records.iter_mut().find(|r| has_id(r, id)) {
        Some(slot) => {
            *slot = record;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueStore;
    use crate::remote::{MockProbe, MockRemote};
    use crate::status::StatusReporter;
    use serde_json::json;
    use tenantry_storage::InMemoryStore;

    struct Fixture {
        collection: Collection,
        store: Arc<InMemoryStore>,
        queue: QueueStore,
        remote: Arc<MockRemote>,
        monitor: Arc<ConnectivityMonitor>,
    }

    fn fixture(online: bool) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let status = Arc::new(StatusReporter::new());
        let queue = QueueStore::new(store.clone(), "pending_changes");
        let monitor = Arc::new(ConnectivityMonitor::new(
            Arc::new(MockProbe::new(true)),
            Duration::from_millis(50),
            status.clone(),
        ));
        monitor.set_network(online);
        monitor.set_backend(online);
        let remote = Arc::new(MockRemote::new(EntityType::Property));
        let collection = Collection::new(
            EntityType::Property,
            store.clone(),
            Some(remote.clone()),
            ChangeRecorder::new(queue.clone(), status),
            monitor.clone(),
            Duration::from_secs(1),
        );
        Fixture {
            collection,
            store,
            queue,
            remote,
            monitor,
        }
    }

    #[tokio::test]
    async fn offline_create_is_visible_and_queued() {
        let f = fixture(false);

        let (record, outcome) = f.collection.create(json!({"name": "Elm St"})).await.unwrap();
        let id = record_id_of(&record).unwrap();
        assert!(is_provisional(&id));
        assert!(matches!(outcome, WriteOutcome::Queued(Recorded::Queued(_))));

        assert_eq!(f.collection.get(&id).unwrap()["name"], json!("Elm St"));
        assert_eq!(f.queue.pending_count(), 1);
        assert_eq!(f.remote.call_count(), 0);
        assert_eq!(
            f.store.get("properties").unwrap().unwrap().as_array().unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn online_create_takes_backend_id() {
        let f = fixture(true);

        let (record, outcome) = f.collection.create(json!({"name": "Oak Ave"})).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Confirmed);
        assert_eq!(record["id"], json!("property-1"));
        assert!(f.collection.get("property-1").is_some());
        assert_eq!(f.collection.len(), 1);
        assert_eq!(f.queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn rejected_online_write_falls_back_to_queue() {
        let f = fixture(true);
        f.collection.replace_all(vec![json!({"id": "p1", "rent": 1000})]);
        f.remote.fail_record("p1");

        let outcome = f
            .collection
            .update("p1", json!({"rent": 1100}))
            .await
            .unwrap();
        assert!(matches!(outcome, WriteOutcome::Queued(Recorded::Queued(_))));
        assert_eq!(f.collection.get("p1").unwrap()["rent"], json!(1100));
        assert_eq!(f.queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn newer_edit_replaces_queued_edit() {
        let f = fixture(true);
        f.collection.replace_all(vec![json!({"id": "p1", "rent": 1000})]);
        f.remote.fail_record("p1");
        f.collection.update("p1", json!({"rent": 1100})).await.unwrap();

        // Backend is healthy again, but the queued edit must not be replayed
        // over this one.
        f.remote.heal_record("p1");
        let outcome = f
            .collection
            .update("p1", json!({"rent": 1200}))
            .await
            .unwrap();
        assert!(matches!(outcome, WriteOutcome::Queued(Recorded::Queued(_))));

        let pending = f.queue.load().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.entries()[0].payload["rent"], json!(1200));
        assert_eq!(f.collection.get("p1").unwrap()["rent"], json!(1200));
    }

    #[tokio::test]
    async fn online_delete_cancels_queued_create() {
        let f = fixture(false);
        f.collection.create(json!({"id": "p7", "name": "A"})).await.unwrap();
        assert_eq!(f.queue.pending_count(), 1);

        f.monitor.set_network(true);
        f.monitor.set_backend(true);
        let outcome = f.collection.delete("p7").await.unwrap();

        assert_eq!(outcome, WriteOutcome::Queued(Recorded::Collapsed));
        assert_eq!(f.queue.pending_count(), 0);
        assert_eq!(f.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let f = fixture(false);
        f.collection.create(json!({"id": "p1", "name": "A"})).await.unwrap();

        let result = f.collection.create(json!({"id": "p1", "name": "B"})).await;
        assert!(matches!(result, Err(SyncError::DuplicateRecord { .. })));
        assert_eq!(f.collection.len(), 1);
        assert_eq!(f.collection.get("p1").unwrap()["name"], json!("A"));
        assert_eq!(f.queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn deleting_offline_create_cancels_it() {
        let f = fixture(false);
        let (record, _) = f.collection.create(json!({"name": "Tmp"})).await.unwrap();
        let id = record_id_of(&record).unwrap();

        // Even online, a provisional id never reaches the backend directly.
        f.monitor.set_network(true);
        f.monitor.set_backend(true);
        let outcome = f.collection.delete(&id).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Queued(Recorded::Collapsed));
        assert!(f.collection.is_empty());
        assert_eq!(f.queue.pending_count(), 0);
        assert_eq!(f.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_records_are_reported() {
        let f = fixture(false);
        assert!(matches!(
            f.collection.update("nope", json!({})).await,
            Err(SyncError::RecordNotFound { .. })
        ));
        assert!(matches!(
            f.collection.delete("nope").await,
            Err(SyncError::RecordNotFound { .. })
        ));
        assert!(matches!(
            f.collection.create(json!("not an object")).await,
            Err(SyncError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_write_failure_keeps_session_state() {
        let f = fixture(false);
        f.store.set_fail_writes(true);

        let (record, outcome) = f.collection.create(json!({"name": "A"})).await.unwrap();
        let id = record_id_of(&record).unwrap();
        assert!(f.collection.get(&id).is_some());
        assert!(matches!(outcome, WriteOutcome::Queued(Recorded::NotPersisted(_))));
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let f = fixture(false);
        f.collection.create(json!({"id": "p1", "name": "A"})).await.unwrap();

        let reopened = Collection::new(
            EntityType::Property,
            f.store.clone(),
            None,
            ChangeRecorder::new(f.queue.clone(), Arc::new(StatusReporter::new())),
            f.monitor.clone(),
            Duration::from_secs(1),
        );
        assert_eq!(reopened.get("p1").unwrap()["name"], json!("A"));
    }
}
