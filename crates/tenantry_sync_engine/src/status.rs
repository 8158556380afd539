//! Observable sync status.

use serde::Serialize;
use tenantry_sync_protocol::EntityType;
use tokio::sync::watch;

/// Error reported when a cycle is skipped because the backend did not answer.
pub const BACKEND_UNREACHABLE: &str = "backend unreachable";

/// How the last sync cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Every queued change was delivered.
    Completed,
    /// The cycle ran but some changes were rejected and remain queued.
    PartialFailure,
    /// The backend probe failed; the queue was not touched.
    BackendUnreachable,
    /// The queue document could not be read; nothing was sent.
    QueueUnavailable,
}

impl SyncOutcome {
    /// Returns true if the whole cycle was aborted before draining.
    pub fn is_total_failure(&self) -> bool {
        matches!(
            self,
            SyncOutcome::BackendUnreachable | SyncOutcome::QueueUnavailable
        )
    }
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// How the cycle ended.
    pub outcome: SyncOutcome,
    /// Changes sent to the backend.
    pub attempted: usize,
    /// Changes confirmed and removed from the queue.
    pub succeeded: usize,
    /// Changes rejected and left in the queue.
    pub failed: usize,
    /// Collections whose provisional creates were confirmed; the caller
    /// should refetch them to pick up backend-assigned ids.
    pub refetch: Vec<EntityType>,
    /// Cycle start, Unix milliseconds.
    pub started_at: u64,
    /// Cycle duration in milliseconds.
    pub duration_ms: u64,
}

impl CycleSummary {
    /// Summary for a cycle aborted before any change was sent.
    pub fn aborted(outcome: SyncOutcome, started_at: u64, duration_ms: u64) -> Self {
        Self {
            outcome,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            refetch: Vec::new(),
            started_at,
            duration_ms,
        }
    }
}

/// Derived sync state consumed by status indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Network and backend both reachable.
    pub is_online: bool,
    /// A cycle is in flight.
    pub is_syncing: bool,
    /// End of the last drained cycle, Unix milliseconds.
    pub last_sync_time: Option<u64>,
    /// Number of queued changes.
    pub pending_count: usize,
    /// Errors of the last cycle, reset when a cycle starts.
    pub errors: Vec<String>,
    /// Details of the last cycle.
    pub last_cycle: Option<CycleSummary>,
}

impl SyncStatus {
    /// Returns true if the last cycle reported errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the outcome of the last cycle, if any ran.
    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.last_cycle.as_ref().map(|c| c.outcome)
    }
}

/// Publishes [`SyncStatus`] snapshots to any number of observers.
#[derive(Debug)]
pub struct StatusReporter {
    tx: watch::Sender<SyncStatus>,
}

impl StatusReporter {
    /// Creates a reporter with the default (offline, idle) status.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::default());
        Self { tx }
    }

    /// Returns the current status.
    pub fn snapshot(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    /// Applies `f` to the status and notifies observers.
    pub fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        self.tx.send_modify(f);
    }

    /// Sets the online flag, notifying only on change.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.is_online != online;
            s.is_online = online;
            changed
        });
    }

    /// Sets the pending count, notifying only on change.
    pub fn set_pending(&self, pending: usize) {
        self.tx.send_if_modified(|s| {
            let changed = s.pending_count != pending;
            s.pending_count = pending;
            changed
        });
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
