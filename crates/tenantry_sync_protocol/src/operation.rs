//! Pending changes.

use crate::entity::EntityType;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix carried by locally generated record ids.
pub const PROVISIONAL_PREFIX: &str = "local-";

/// Kind of mutation carried by a pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Record was created locally.
    Create,
    /// Record was modified locally.
    Update,
    /// Record was deleted locally.
    Delete,
}

impl Operation {
    /// Returns the lowercase name used in queue documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(ProtocolError::UnknownName {
                kind: "operation",
                value: s.to_string(),
            }),
        }
    }
}

/// Opaque identifier of a queued change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A queued mutation awaiting confirmation from the remote backend.
///
/// # Fields
///
/// - `id`: stable identifier of this queue entry
/// - `operation`: create, update or delete
/// - `entity_type`: which collection the record belongs to
/// - `payload`: the full record for create/update, `{"id": ..}` for delete
/// - `record_id`: the record's own id, used for dedup and correlation
/// - `created_at`: Unix milliseconds, establishes replay order
///
/// Entries are never edited in place: a newer change for the same record
/// replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Queue entry id.
    pub id: ChangeId,
    /// Operation kind.
    pub operation: Operation,
    /// Entity type.
    pub entity_type: EntityType,
    /// Record data.
    pub payload: Value,
    /// Id of the affected record.
    pub record_id: String,
    /// Creation time in Unix milliseconds.
    pub created_at: u64,
}

impl PendingChange {
    /// Creates a change with a fresh id stamped with the current time.
    pub fn new(
        operation: Operation,
        entity_type: EntityType,
        payload: Value,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            id: ChangeId::new(),
            operation,
            entity_type,
            payload,
            record_id: record_id.into(),
            created_at: now_millis(),
        }
    }

    /// Overrides the creation timestamp.
    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns true if both changes target the same record.
    pub fn same_record(&self, other: &PendingChange) -> bool {
        self.entity_type == other.entity_type && self.record_id == other.record_id
    }

    /// Returns true if `other` is a change of the same class for the same
    /// record, i.e. one of the two must absorb the other.
    pub fn supersedes(&self, other: &PendingChange) -> bool {
        self.same_record(other) && self.operation == other.operation
    }

    /// Returns true if the record id was generated locally.
    pub fn has_provisional_id(&self) -> bool {
        is_provisional(&self.record_id)
    }

    /// Human-readable label such as `property create`.
    pub fn label(&self) -> String {
        format!("{} {}", self.entity_type, self.operation)
    }
}

/// Extracts the record id from a payload's `id` field.
///
/// String and integer ids are accepted; empty strings are not.
pub fn record_id_of(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Generates a provisional id for a record created while offline.
pub fn provisional_id() -> String {
    format!("{PROVISIONAL_PREFIX}{}", uuid::Uuid::new_v4())
}

/// Returns true if `id` was produced by [`provisional_id`].
pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
