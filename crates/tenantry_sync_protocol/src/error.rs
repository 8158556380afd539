//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting queue documents and payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload has no usable `id` field.
    #[error("payload for {entity} {operation} has no id")]
    MissingRecordId {
        /// Entity type name.
        entity: String,
        /// Operation name.
        operation: String,
    },

    /// The persisted queue document does not have the expected shape.
    #[error("invalid queue document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    /// An unknown entity type or operation name.
    #[error("unknown {kind}: {value:?}")]
    UnknownName {
        /// What was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}
