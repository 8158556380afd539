//! Change recorder: appends unconfirmed writes to the pending queue.

use crate::queue::QueueStore;
use crate::status::StatusReporter;
use serde_json::Value;
use std::sync::Arc;
use tenantry_sync_protocol::{
    provisional_id, record_id_of, ChangeId, EnqueueOutcome, EntityType, Operation, PendingChange,
};

/// What happened to a recorded change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// The change is queued under this id.
    Queued(ChangeId),
    /// A delete cancelled a still-pending create; nothing is queued.
    Collapsed,
    /// The change could not be correlated with a record and was dropped.
    Rejected(String),
    /// The queue could not be read or written; the change is not durable.
    NotPersisted(String),
}

impl Recorded {
    /// Returns the queued change id, if any.
    pub fn change_id(&self) -> Option<&ChangeId> {
        match self {
            Recorded::Queued(id) => Some(id),
            _ => None,
        }
    }
}

/// Records writes that could not be confirmed against the remote backend.
#[derive(Clone)]
pub struct ChangeRecorder {
    queue: QueueStore,
    status: Arc<StatusReporter>,
}

impl ChangeRecorder {
    /// Creates a recorder over the given queue.
    pub fn new(queue: QueueStore, status: Arc<StatusReporter>) -> Self {
        Self { queue, status }
    }

    /// Queues a mutation, deduplicating against pending entries.
    ///
    /// A create whose payload has no `id` gets a provisional one. Failures
    /// are logged and reported through the return value; this never panics
    /// or propagates an error.
    pub fn record(&self, operation: Operation, entity_type: EntityType, payload: Value) -> Recorded {
        let (payload, record_id) = match assign_record_id(operation, payload) {
            Ok(pair) => pair,
            Err(reason) => {
                tracing::warn!(%entity_type, %operation, %reason, "pending change rejected");
                return Recorded::Rejected(reason);
            }
        };

        let mut change = PendingChange::new(operation, entity_type, payload, record_id);
        let result = self.queue.update(|queue| {
            // Keep replay order monotonic even if the wall clock steps back.
            if let Some(latest) = queue.iter().map(|e| e.created_at).max() {
                change.created_at = change.created_at.max(latest);
            }
            queue.enqueue(change)
        });

        let recorded = match result {
            Ok(EnqueueOutcome::Appended(id)) | Ok(EnqueueOutcome::Replaced { id, .. }) => {
                tracing::debug!(%entity_type, %operation, change_id = %id, "pending change queued");
                Recorded::Queued(id)
            }
            Ok(EnqueueOutcome::Collapsed { removed }) => {
                tracing::debug!(%entity_type, removed, "delete cancelled pending create");
                Recorded::Collapsed
            }
            Err(err) => {
                tracing::error!(%entity_type, %operation, error = %err, "failed to persist pending change");
                Recorded::NotPersisted(err.to_string())
            }
        };

        self.status.set_pending(self.queue.pending_count());
        recorded
    }

    /// Returns true if a change for the record is still queued.
    ///
    /// An unreadable queue counts as empty: nothing in it can be replayed.
    pub fn has_pending(&self, entity_type: EntityType, record_id: &str) -> bool {
        match self.queue.load() {
            Ok(queue) => queue.has_pending_for(entity_type, record_id),
            Err(err) => {
                tracing::warn!(%entity_type, record_id, error = %err, "pending queue unreadable");
                false
            }
        }
    }
}

fn assign_record_id(operation: Operation, mut payload: Value) -> Result<(Value, String), String> {
    if let Some(id) = record_id_of(&payload) {
        return Ok((payload, id));
    }
    if operation != Operation::Create {
        return Err(format!("{operation} payload has no id"));
    }
    let id = provisional_id();
    match payload.as_object_mut() {
        Some(map) => {
            map.insert("id".into(), Value::String(id.clone()));
        }
        None => return Err("create payload must be a JSON object".into()),
    }
    Ok((payload, id))
}
