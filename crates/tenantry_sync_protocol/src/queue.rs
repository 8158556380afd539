//! The pending-change queue.

use crate::entity::EntityType;
use crate::error::ProtocolResult;
use crate::operation::{ChangeId, Operation, PendingChange};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// What [`PendingQueue::enqueue`] did with a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The change was appended; nothing was pending for it.
    Appended(ChangeId),
    /// The change replaced an entry of the same class for the same record.
    Replaced {
        /// Id of the newly queued entry.
        id: ChangeId,
        /// Id of the entry it replaced.
        previous: ChangeId,
    },
    /// A delete met a still-pending create: both cancel out, together with
    /// the record's pending updates.
    Collapsed {
        /// Number of entries removed.
        removed: usize,
    },
}

impl EnqueueOutcome {
    /// Returns the id of the queued entry, if one was queued.
    pub fn queued_id(&self) -> Option<&ChangeId> {
        match self {
            EnqueueOutcome::Appended(id) | EnqueueOutcome::Replaced { id, .. } => Some(id),
            EnqueueOutcome::Collapsed { .. } => None,
        }
    }
}

/// An ordered queue of pending changes.
///
/// The queue is loaded from and written back to the local store as one
/// JSON array; it is never streamed.
///
/// # Invariants
///
/// - At most one entry per `(entity_type, record_id, operation)`
/// - A delete never follows a pending create of the same record; the two
///   collapse instead, because the backend has never seen that record
/// - Entries are kept in insertion order; [`PendingQueue::drain_order`]
///   sorts by `created_at` with insertion order breaking ties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQueue {
    entries: Vec<PendingChange>,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a queue from already-validated entries.
    pub fn from_entries(entries: Vec<PendingChange>) -> Self {
        Self { entries }
    }

    /// Decodes the persisted JSON array. `null` decodes as an empty queue.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        if value.is_null() {
            return Ok(Self::new());
        }
        let entries: Vec<PendingChange> = serde_json::from_value(value)?;
        Ok(Self { entries })
    }

    /// Encodes the queue as the JSON array stored under the queue key.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(&self.entries)?)
    }

    /// Adds a change, applying the deduplication rules.
    ///
    /// A delete that meets a pending create removes the record's pending
    /// create and updates. A delete queued before the create, for a version
    /// the backend already knows, is kept.
    pub fn enqueue(&mut self, change: PendingChange) -> EnqueueOutcome {
        if change.operation == Operation::Delete
            && self
                .entries
                .iter()
                .any(|e| e.operation == Operation::Create && e.same_record(&change))
        {
            let before = self.entries.len();
            self.entries
                .retain(|e| !e.same_record(&change) || e.operation == Operation::Delete);
            return EnqueueOutcome::Collapsed {
                removed: before - self.entries.len(),
            };
        }

        let previous = self
            .entries
            .iter()
            .position(|e| e.supersedes(&change))
            .map(|pos| self.entries.remove(pos).id);

        let id = change.id.clone();
        self.entries.push(change);

        match previous {
            Some(previous) => EnqueueOutcome::Replaced { id, previous },
            None => EnqueueOutcome::Appended(id),
        }
    }

    /// Returns the entries in replay order (ascending `created_at`).
    pub fn drain_order(&self) -> Vec<PendingChange> {
        let mut ordered = self.entries.clone();
        ordered.sort_by_key(|e| e.created_at);
        ordered
    }

    /// Removes the entries with the given ids, returning how many were removed.
    pub fn remove_ids(&mut self, ids: &HashSet<ChangeId>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.id));
        before - self.entries.len()
    }

    /// Returns true if any entry targets the given record.
    pub fn has_pending_for(&self, entity_type: EntityType, record_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.entity_type == entity_type && e.record_id == record_id)
    }

    /// Returns the entries in insertion order.
    pub fn entries(&self) -> &[PendingChange] {
        &self.entries
    }

    /// Iterates the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.entries.iter()
    }

    /// Number of pending entries per entity type.
    pub fn counts_by_entity(&self) -> BTreeMap<EntityType, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.entity_type).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
