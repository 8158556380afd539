//! Remote backend abstraction.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tenantry_sync_protocol::{is_provisional, record_id_of, EntityType, Operation, PendingChange};
use tokio::sync::Semaphore;

/// Create/update/delete calls against the remote backend for one entity type.
///
/// Each call either resolves or rejects; rejection is the only failure
/// signal the sync engine understands. Implementations are expected to
/// treat updates as upserts.
#[async_trait]
pub trait RemoteOperations: Send + Sync {
    /// Creates a record and returns it as stored remotely.
    async fn create(&self, payload: &Value) -> RemoteResult<Value>;

    /// Updates the record with `id` and returns it as stored remotely.
    async fn update(&self, id: &str, payload: &Value) -> RemoteResult<Value>;

    /// Deletes the record with `id`.
    async fn delete(&self, id: &str) -> RemoteResult<()>;
}

/// A lightweight reachability check against the remote backend.
///
/// Must not fail; an unreachable backend is reported as `false`.
#[async_trait]
pub trait BackendProbe: Send + Sync {
    /// Returns true if the backend answered.
    async fn probe(&self) -> bool;
}

/// Maps each entity type to its remote operations.
///
/// Adding an entity type is a registration, not a change to the engine.
#[derive(Clone, Default)]
pub struct RemoteRegistry {
    handlers: HashMap<EntityType, Arc<dyn RemoteOperations>>,
}

impl RemoteRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the remote operations for an entity type, replacing any
    /// previous registration.
    pub fn register(&mut self, entity_type: EntityType, remote: Arc<dyn RemoteOperations>) {
        self.handlers.insert(entity_type, remote);
    }

    /// Builder form of [`RemoteRegistry::register`].
    pub fn with(mut self, entity_type: EntityType, remote: Arc<dyn RemoteOperations>) -> Self {
        self.register(entity_type, remote);
        self
    }

    /// Returns the remote operations for an entity type.
    pub fn get(&self, entity_type: EntityType) -> Option<Arc<dyn RemoteOperations>> {
        self.handlers.get(&entity_type).cloned()
    }

    /// Returns the registered entity types.
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// Sends one pending change to the matching remote operation.
    pub async fn dispatch(&self, change: &PendingChange) -> RemoteResult<()> {
        let remote = self
            .get(change.entity_type)
            .ok_or(RemoteError::NotRegistered(change.entity_type))?;

        match change.operation {
            Operation::Create => remote.create(&change.payload).await.map(|_| ()),
            Operation::Update => remote
                .update(&change.record_id, &change.payload)
                .await
                .map(|_| ()),
            Operation::Delete => remote.delete(&change.record_id).await,
        }
    }
}

impl fmt::Debug for RemoteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRegistry")
            .field("entity_types", &self.entity_types())
            .finish()
    }
}

/// One call observed by a [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    /// Entity type the mock serves.
    pub entity_type: EntityType,
    /// Operation invoked.
    pub operation: Operation,
    /// Record id (the payload id for creates).
    pub record_id: String,
}

/// A call log shared between several mocks, preserving global call order.
pub type CallLog = Arc<Mutex<Vec<RemoteCall>>>;

/// An in-memory remote backend for testing.
///
/// Records every call, keeps the records it accepted, assigns backend ids
/// to provisional creates, and can be told to reject specific records or
/// to hold calls until released.
pub struct MockRemote {
    entity_type: EntityType,
    log: CallLog,
    records: Mutex<BTreeMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    gate: Option<Semaphore>,
    next_id: AtomicU64,
}

impl MockRemote {
    /// Creates a mock with its own call log.
    pub fn new(entity_type: EntityType) -> Self {
        Self::with_log(entity_type, CallLog::default())
    }

    /// Creates a mock that appends to a shared call log.
    pub fn with_log(entity_type: EntityType, log: CallLog) -> Self {
        Self {
            entity_type,
            log,
            records: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
            gate: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Makes every call wait for [`MockRemote::release`] before completing.
    pub fn held(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Lets `calls` held calls proceed.
    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    /// Rejects every call for the given record id.
    pub fn fail_record(&self, record_id: impl Into<String>) {
        self.failing.lock().insert(record_id.into());
    }

    /// Stops rejecting calls for the given record id.
    pub fn heal_record(&self, record_id: &str) {
        self.failing.lock().remove(record_id);
    }

    /// Rejects every call (or stops doing so).
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Returns the calls recorded in the log, across all mocks sharing it.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.log.lock().clone()
    }

    /// Returns how many calls this log has seen.
    pub fn call_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns the records currently stored by this mock.
    pub fn records(&self) -> BTreeMap<String, Value> {
        self.records.lock().clone()
    }

    async fn enter(&self, operation: Operation, record_id: &str) -> RemoteResult<()> {
        self.log.lock().push(RemoteCall {
            entity_type: self.entity_type,
            operation,
            record_id: record_id.to_string(),
        });

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| RemoteError::Unreachable("mock closed".into()))?;
            permit.forget();
        }

        if self.fail_all.load(Ordering::SeqCst) || self.failing.lock().contains(record_id) {
            return Err(RemoteError::Rejected(format!(
                "{} {} {} refused",
                self.entity_type, operation, record_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteOperations for MockRemote {
    async fn create(&self, payload: &Value) -> RemoteResult<Value> {
        let local_id = record_id_of(payload).unwrap_or_default();
        self.enter(Operation::Create, &local_id).await?;

        let id = if local_id.is_empty() || is_provisional(&local_id) {
            format!(
                "{}-{}",
                self.entity_type,
                self.next_id.fetch_add(1, Ordering::SeqCst)
            )
        } else {
            local_id
        };
        let mut record = payload.clone();
        if let Value::Object(map) = &mut record {
            map.insert("id".into(), Value::String(id.clone()));
        }
        self.records.lock().insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, payload: &Value) -> RemoteResult<Value> {
        self.enter(Operation::Update, id).await?;
        self.records.lock().insert(id.to_string(), payload.clone());
        Ok(payload.clone())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        self.enter(Operation::Delete, id).await?;
        self.records.lock().remove(id);
        Ok(())
    }
}

/// A backend probe whose answer is set by the test.
#[derive(Debug)]
pub struct MockProbe {
    reachable: AtomicBool,
    probes: AtomicUsize,
}

impl MockProbe {
    /// Creates a probe with the given initial answer.
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            probes: AtomicUsize::new(0),
        }
    }

    /// Changes the answer.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of probes answered so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendProbe for MockProbe {
    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_remote_assigns_ids_to_provisional_creates() {
        let remote = MockRemote::new(EntityType::Property);

        let created = remote
            .create(&json!({"id": "local-abc", "name": "A"}))
            .await
            .unwrap();
        assert_eq!(created["id"], json!("property-1"));

        let kept = remote.create(&json!({"id": "p7"})).await.unwrap();
        assert_eq!(kept["id"], json!("p7"));
        assert_eq!(remote.records().len(), 2);
    }

    #[tokio::test]
    async fn mock_remote_failure_injection() {
        let remote = MockRemote::new(EntityType::Tenant);
        remote.fail_record("t1");

        assert!(matches!(
            remote.update("t1", &json!({})).await,
            Err(RemoteError::Rejected(_))
        ));
        remote.heal_record("t1");
        assert!(remote.update("t1", &json!({})).await.is_ok());
        assert_eq!(remote.call_count(), 2);
    }

    #[tokio::test]
    async fn registry_dispatches_by_entity_and_operation() {
        let log = CallLog::default();
        let tenants = Arc::new(MockRemote::with_log(EntityType::Tenant, log.clone()));
        let registry = RemoteRegistry::new().with(EntityType::Tenant, tenants.clone());

        let change = PendingChange::new(
            Operation::Delete,
            EntityType::Tenant,
            json!({"id": "t1"}),
            "t1",
        );
        registry.dispatch(&change).await.unwrap();

        let missing = PendingChange::new(
            Operation::Create,
            EntityType::Informor,
            json!({"id": "i1"}),
            "i1",
        );
        assert_eq!(
            registry.dispatch(&missing).await,
            Err(RemoteError::NotRegistered(EntityType::Informor))
        );

        let calls = log.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, Operation::Delete);
        assert_eq!(registry.entity_types(), vec![EntityType::Tenant]);
    }

    #[tokio::test]
    async fn mock_probe_counts() {
        let probe = MockProbe::new(false);
        assert!(!probe.probe().await);
        probe.set_reachable(true);
        assert!(probe.probe().await);
        assert_eq!(probe.probe_count(), 2);
    }
}
