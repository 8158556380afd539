//! Sync engine: drains the pending queue against the remote backend.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::RemoteError;
use crate::queue::QueueStore;
use crate::remote::RemoteRegistry;
use crate::status::{CycleSummary, StatusReporter, SyncOutcome, SyncStatus, BACKEND_UNREACHABLE};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tenantry_sync_protocol::{now_millis, Operation, PendingChange};
use tokio::sync::watch;

/// The sync engine replays queued changes against the remote backend.
///
/// # Cycle
///
/// 1. If a cycle is already in flight, wait for it and return its status
/// 2. Probe the backend; if unreachable, report and leave the queue alone
/// 3. Mark the status as syncing and clear the previous errors
/// 4. Load the queue once and order it by `created_at`
/// 5. Dispatch every entry; failures are recorded and the drain continues
/// 6. Remove confirmed entries from the stored queue
/// 7. Report which collections had provisional creates confirmed
/// 8. Publish the final status
///
/// Failed entries stay queued and are retried by the next cycle.
pub struct SyncEngine {
    config: SyncConfig,
    queue: QueueStore,
    registry: RemoteRegistry,
    monitor: Arc<ConnectivityMonitor>,
    status: Arc<StatusReporter>,
    in_flight: AtomicBool,
    finished: watch::Sender<u64>,
}

/// Releases the in-flight flag even if the cycle future is dropped.
struct CycleGuard<'a> {
    engine: &'a SyncEngine,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.engine.status.update(|s| s.is_syncing = false);
        self.engine.in_flight.store(false, Ordering::SeqCst);
        self.engine.finished.send_modify(|n| *n = n.wrapping_add(1));
    }
}

impl SyncEngine {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        queue: QueueStore,
        registry: RemoteRegistry,
        monitor: Arc<ConnectivityMonitor>,
        status: Arc<StatusReporter>,
    ) -> Self {
        let (finished, _rx) = watch::channel(0);
        Self {
            config,
            queue,
            registry,
            monitor,
            status,
            in_flight: AtomicBool::new(false),
            finished,
        }
    }

    /// Returns true while a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    /// Runs one sync cycle, or joins the cycle already in flight.
    ///
    /// Never fails: every error ends up in the returned status.
    pub async fn perform_sync(&self) -> SyncStatus {
        // Subscribe before checking the flag so a cycle finishing in between
        // is still observed.
        let mut finished = self.finished.subscribe();
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("sync already in flight, waiting for it");
            let _ = finished.changed().await;
            return self.status.snapshot();
        }

        let _guard = CycleGuard { engine: self };
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> SyncStatus {
        let start = Instant::now();
        let started_at = now_millis();

        let probe = self.monitor.probe_backend().await;
        if !probe.reachable {
            tracing::warn!("backend unreachable, sync skipped");
            let pending = self.queue.pending_count();
            self.status.update(|s| {
                s.is_online = false;
                s.pending_count = pending;
                s.errors = vec![BACKEND_UNREACHABLE.to_string()];
                s.last_cycle = Some(CycleSummary::aborted(
                    SyncOutcome::BackendUnreachable,
                    started_at,
                    elapsed_ms(start),
                ));
            });
            return self.status.snapshot();
        }

        self.status.update(|s| {
            s.is_syncing = true;
            s.errors.clear();
        });

        let queue = match self.queue.load() {
            Ok(queue) => queue,
            Err(err) => {
                tracing::error!(error = %err, "pending queue unreadable, sync aborted");
                self.status.update(|s| {
                    s.is_syncing = false;
                    s.errors = vec![format!("pending queue unreadable: {err}")];
                    s.last_cycle = Some(CycleSummary::aborted(
                        SyncOutcome::QueueUnavailable,
                        started_at,
                        elapsed_ms(start),
                    ));
                });
                return self.status.snapshot();
            }
        };

        let ordered = queue.drain_order();
        let mut confirmed = HashSet::new();
        let mut refetch = BTreeSet::new();
        let mut errors = Vec::new();

        for change in &ordered {
            match self.dispatch(change).await {
                Ok(()) => {
                    tracing::debug!(change = %change.label(), record_id = %change.record_id, "change delivered");
                    if change.operation == Operation::Create && change.has_provisional_id() {
                        refetch.insert(change.entity_type);
                    }
                    confirmed.insert(change.id.clone());
                }
                Err(err) => {
                    tracing::warn!(change = %change.label(), record_id = %change.record_id, error = %err, "change failed");
                    errors.push(format!(
                        "Failed to sync {} {} ({}): {}",
                        change.entity_type, change.operation, change.record_id, err
                    ));
                }
            }
        }

        // Re-read the stored queue so changes recorded during the drain survive.
        if !confirmed.is_empty() {
            if let Err(err) = self.queue.update(|q| q.remove_ids(&confirmed)) {
                tracing::error!(error = %err, "failed to persist drained queue");
                errors.push(format!("Failed to persist pending queue: {err}"));
            }
        }

        let pending = self.queue.pending_count();
        let summary = CycleSummary {
            outcome: if errors.is_empty() {
                SyncOutcome::Completed
            } else {
                SyncOutcome::PartialFailure
            },
            attempted: ordered.len(),
            succeeded: confirmed.len(),
            failed: ordered.len() - confirmed.len(),
            refetch: refetch.into_iter().collect(),
            started_at,
            duration_ms: elapsed_ms(start),
        };

        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            pending,
            "sync cycle finished"
        );

        self.status.update(|s| {
            s.is_syncing = false;
            s.last_sync_time = Some(now_millis());
            s.pending_count = pending;
            s.errors = errors;
            s.last_cycle = Some(summary);
        });
        self.status.snapshot()
    }

    async fn dispatch(&self, change: &PendingChange) -> Result<(), RemoteError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.registry.dispatch(change)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(timeout)),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
