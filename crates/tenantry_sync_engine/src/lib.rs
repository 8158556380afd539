//! # Tenantry Sync Engine
//!
//! Offline-first sync manager for tenantry.
//!
//! This crate provides:
//! - Change recorder with per-record deduplication
//! - Connectivity monitor (network signal AND backend probe)
//! - Sync engine replaying the pending queue in creation order
//! - Observable sync status
//! - Offline-aware entity collections
//!
//! ## Architecture
//!
//! Writes go to the local snapshot first. When the backend cannot confirm
//! them they are queued; the engine drains the queue once the system is
//! online again:
//! 1. A network edge arrives, the manager waits out the settle delay
//! 2. The backend is probed
//! 3. If online with queued changes, one cycle runs
//! 4. Failed entries stay queued for the next periodic probe
//!
//! ## Key Invariants
//!
//! - At most one sync cycle runs at a time
//! - At most one queued entry per `(entity, record, operation)`
//! - Entries are sent oldest first
//! - An entry leaves the queue only after the backend confirmed it
//! - Local persistence failures never block the caller

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod connectivity;
mod engine;
mod error;
mod manager;
mod queue;
mod recorder;
mod remote;
mod status;

pub use collection::{Collection, WriteOutcome};
pub use config::{SyncConfig, DEFAULT_QUEUE_KEY};
pub use connectivity::{
    ConnectivityMonitor, ManualNetworkSignal, NetworkEvent, NetworkSignal, ProbeOutcome,
    Transition,
};
pub use engine::SyncEngine;
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use manager::{ConfirmDiscard, SyncManager};
pub use queue::QueueStore;
pub use recorder::{ChangeRecorder, Recorded};
pub use remote::{BackendProbe, CallLog, MockProbe, MockRemote, RemoteCall, RemoteOperations, RemoteRegistry};
pub use status::{CycleSummary, StatusReporter, SyncOutcome, SyncStatus, BACKEND_UNREACHABLE};

// Re-exported so implementors of the async seams need no direct dependency.
pub use async_trait::async_trait;
