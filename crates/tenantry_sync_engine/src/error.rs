//! Error types for the sync engine.

use std::time::Duration;
use tenantry_storage::StorageError;
use tenantry_sync_protocol::{EntityType, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures reported by the remote backend seam.
///
/// A rejected call is the only failure signal the engine understands; the
/// variants exist so logs and status messages say why.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The backend answered and refused the operation.
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The call did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// No remote operations are registered for the entity type.
    #[error("no remote operations registered for {0}")]
    NotRegistered(EntityType),
}

/// Errors raised inside the sync subsystem.
///
/// These never reach `perform_sync` or `add_pending_change` callers; they
/// are logged and converted to status data at the boundary.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local store failure.
    #[error("local store error: {0}")]
    Storage(#[from] StorageError),

    /// The persisted queue could not be decoded or encoded.
    #[error("queue document error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Remote call failure.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The record does not exist in the local collection.
    #[error("{entity} {id} not found")]
    RecordNotFound {
        /// Entity type.
        entity: EntityType,
        /// Record id.
        id: String,
    },

    /// A record with this id is already in the local collection.
    #[error("{entity} {id} already exists")]
    DuplicateRecord {
        /// Entity type.
        entity: EntityType,
        /// Record id.
        id: String,
    },

    /// The payload is not a JSON object.
    #[error("{entity} payload must be a JSON object")]
    InvalidPayload {
        /// Entity type.
        entity: EntityType,
    },
}
