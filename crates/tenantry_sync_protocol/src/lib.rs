//! # Tenantry Sync Protocol
//!
//! Pending-change model and queue rules for tenantry offline sync.
//!
//! This crate provides:
//! - [`EntityType`] and [`Operation`], the fixed vocabularies of the queue
//! - [`PendingChange`], one queued mutation awaiting remote delivery
//! - [`PendingQueue`], the ordered queue with its deduplication rules
//! - Record id helpers, including provisional ids for offline creates
//!
//! This is a pure data crate with no I/O operations. The queue is
//! persisted by the engine as a single JSON array.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod operation;
mod queue;

pub use entity::EntityType;
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{
    is_provisional, now_millis, provisional_id, record_id_of, ChangeId, Operation, PendingChange,
    PROVISIONAL_PREFIX,
};
pub use queue::{EnqueueOutcome, PendingQueue};
