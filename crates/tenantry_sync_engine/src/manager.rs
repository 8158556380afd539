//! The sync manager: owns the offline subsystems and their background tasks.

use crate::collection::Collection;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, NetworkEvent, NetworkSignal};
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::queue::QueueStore;
use crate::recorder::{ChangeRecorder, Recorded};
use crate::remote::{BackendProbe, RemoteRegistry};
use crate::status::{StatusReporter, SyncStatus};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tenantry_storage::LocalStore;
use tenantry_sync_protocol::{EntityType, Operation, PendingChange};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Explicit acknowledgement required by [`SyncManager::clear_pending_changes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDiscard {
    /// Every queued change is dropped without being delivered.
    DropAllPendingChanges,
}

/// Offline-first sync manager.
///
/// Wires the change recorder, connectivity monitor, sync engine and status
/// reporter around one local store. Nothing runs in the background until
/// [`SyncManager::start`] is called; [`SyncManager::stop`] (or dropping the
/// manager) cancels the background tasks.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tenantry_storage::InMemoryStore;
/// use tenantry_sync_engine::{
///     ManualNetworkSignal, MockProbe, MockRemote, RemoteRegistry, SyncConfig, SyncManager,
/// };
/// use tenantry_sync_protocol::EntityType;
///
/// # async fn run() {
/// let registry = RemoteRegistry::new()
///     .with(EntityType::Tenant, Arc::new(MockRemote::new(EntityType::Tenant)));
/// let manager = SyncManager::new(
///     SyncConfig::default(),
///     Arc::new(InMemoryStore::new()),
///     registry,
///     Arc::new(MockProbe::new(true)),
///     Arc::new(ManualNetworkSignal::new(true)),
/// );
/// manager.start();
/// let status = manager.perform_sync().await;
/// assert!(status.errors.is_empty());
/// # }
/// ```
pub struct SyncManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    store: Arc<dyn LocalStore>,
    registry: RemoteRegistry,
    network: Arc<dyn NetworkSignal>,
    monitor: Arc<ConnectivityMonitor>,
    status: Arc<StatusReporter>,
    queue: QueueStore,
    recorder: ChangeRecorder,
    engine: SyncEngine,
    collections: Mutex<HashMap<EntityType, Arc<Collection>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncManager {
    /// Creates a manager. No task is spawned until [`SyncManager::start`].
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        registry: RemoteRegistry,
        probe: Arc<dyn BackendProbe>,
        network: Arc<dyn NetworkSignal>,
    ) -> Self {
        let status = Arc::new(StatusReporter::new());
        let queue = QueueStore::new(store.clone(), config.queue_key.clone());
        let monitor = Arc::new(ConnectivityMonitor::new(
            probe,
            config.probe_timeout,
            status.clone(),
        ));
        let recorder = ChangeRecorder::new(queue.clone(), status.clone());
        let engine = SyncEngine::new(
            config.clone(),
            queue.clone(),
            registry.clone(),
            monitor.clone(),
            status.clone(),
        );
        monitor.set_network(network.is_reachable());
        status.set_pending(queue.pending_count());

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                registry,
                network,
                monitor,
                status,
                queue,
                recorder,
                engine,
                collections: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts the network-edge task and the periodic backend probe.
    ///
    /// Must be called inside a Tokio runtime. Calling it again while
    /// running does nothing.
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        // Subscribe before reading the current state so no edge is lost.
        let events = self.inner.network.subscribe();
        self.inner
            .monitor
            .set_network(self.inner.network.is_reachable());
        self.inner.refresh_pending();

        tasks.push(tokio::spawn(watch_network(self.inner.clone(), events)));
        tasks.push(tokio::spawn(poll_backend(self.inner.clone())));
        tracing::info!(
            settle_delay = ?self.inner.config.settle_delay,
            probe_interval = ?self.inner.config.probe_interval,
            "sync manager started"
        );
    }

    /// Cancels the background tasks. A cycle already running is dropped at
    /// its next await point; undelivered entries stay queued.
    pub fn stop(&self) {
        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }
        tracing::info!("sync manager stopped");
    }

    /// Returns true between [`SyncManager::start`] and [`SyncManager::stop`].
    pub fn is_running(&self) -> bool {
        !self.inner.tasks.lock().is_empty()
    }

    /// Queues a change that could not be confirmed remotely.
    pub fn add_pending_change(
        &self,
        operation: Operation,
        entity_type: EntityType,
        payload: Value,
    ) -> Recorded {
        self.inner.recorder.record(operation, entity_type, payload)
    }

    /// Runs a sync cycle now, or waits for the one in flight.
    pub async fn perform_sync(&self) -> SyncStatus {
        self.inner.engine.perform_sync().await
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        self.inner.status.snapshot()
    }

    /// Subscribes to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Returns true if network and backend are both reachable.
    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    /// Returns the queued changes in the order the next cycle sends them.
    pub fn pending_changes(&self) -> SyncResult<Vec<PendingChange>> {
        Ok(self.inner.queue.load()?.drain_order())
    }

    /// Drops every queued change without delivering it.
    ///
    /// This loses data. It is never called by the manager itself.
    pub fn clear_pending_changes(&self, confirm: ConfirmDiscard) -> SyncResult<usize> {
        let ConfirmDiscard::DropAllPendingChanges = confirm;
        let dropped = self.inner.queue.clear()?;
        tracing::warn!(dropped, "pending changes discarded");
        self.inner.refresh_pending();
        Ok(dropped)
    }

    /// Returns the collection handle for an entity type.
    ///
    /// Handles are shared: every call for the same type returns the same
    /// snapshot.
    pub fn collection(&self, entity_type: EntityType) -> Arc<Collection> {
        let inner = &self.inner;
        inner
            .collections
            .lock()
            .entry(entity_type)
            .or_insert_with(|| {
                Arc::new(Collection::new(
                    entity_type,
                    inner.store.clone(),
                    inner.registry.get(entity_type),
                    inner.recorder.clone(),
                    inner.monitor.clone(),
                    inner.config.request_timeout,
                ))
            })
            .clone()
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn refresh_pending(&self) -> usize {
        let pending = self.queue.pending_count();
        self.status.set_pending(pending);
        pending
    }

    /// Runs a cycle if changes are queued, otherwise only probes the
    /// backend. Either way the backend is probed exactly once.
    async fn check_and_sync(&self, trigger: &'static str) {
        if !self.monitor.network_reachable() {
            return;
        }
        let pending = self.refresh_pending();
        if pending == 0 {
            let outcome = self.monitor.probe_backend().await;
            tracing::debug!(trigger, reachable = outcome.reachable, "no sync needed");
            return;
        }
        tracing::info!(trigger, pending, "starting sync");
        self.engine.perform_sync().await;
    }

    /// Waits out the settle delay, then probes. Returns early if the
    /// network drops again in the meantime.
    async fn settle_then_sync(&self, events: &mut broadcast::Receiver<NetworkEvent>) {
        let settle = tokio::time::sleep(self.config.settle_delay);
        tokio::pin!(settle);
        loop {
            tokio::select! {
                () = &mut settle => break,
                event = events.recv() => match event {
                    Ok(NetworkEvent::Online) => {}
                    Ok(NetworkEvent::Offline) => {
                        tracing::debug!("network dropped during settle delay");
                        self.monitor.set_network(false);
                        return;
                    }
                    Err(RecvError::Lagged(_)) => {
                        if !self.network.is_reachable() {
                            self.monitor.set_network(false);
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                },
            }
        }
        self.check_and_sync("network restored").await;
    }
}

async fn watch_network(inner: Arc<Inner>, mut events: broadcast::Receiver<NetworkEvent>) {
    loop {
        let reachable = match events.recv().await {
            Ok(NetworkEvent::Online) => true,
            Ok(NetworkEvent::Offline) => false,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "missed network events, resynchronising");
                inner.network.is_reachable()
            }
            Err(RecvError::Closed) => {
                tracing::debug!("network signal closed");
                return;
            }
        };
        inner.monitor.set_network(reachable);
        if reachable {
            inner.settle_then_sync(&mut events).await;
        }
    }
}

async fn poll_backend(inner: Arc<Inner>) {
    // The first tick fires at once, giving the initial probe on start.
    let mut interval = tokio::time::interval(inner.config.probe_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let reachable = inner.network.is_reachable();
        inner.monitor.set_network(reachable);
        if reachable {
            inner.check_and_sync("periodic probe").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualNetworkSignal;
    use crate::remote::{MockProbe, MockRemote};
    use serde_json::json;
    use std::time::Duration;
    use tenantry_storage::InMemoryStore;

    fn manager(online: bool) -> (SyncManager, Arc<MockRemote>, Arc<MockProbe>) {
        let remote = Arc::new(MockRemote::new(EntityType::Tenant));
        let network = Arc::new(ManualNetworkSignal::new(online));
        let probe = Arc::new(MockProbe::new(online));
        let manager = SyncManager::new(
            SyncConfig::default()
                .with_settle_delay(Duration::from_millis(10))
                .with_probe_interval(Duration::from_secs(3600)),
            Arc::new(InMemoryStore::new()),
            RemoteRegistry::new().with(EntityType::Tenant, remote.clone()),
            probe.clone(),
            network,
        );
        (manager, remote, probe)
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_cancels() {
        let (manager, _, _) = manager(false);
        assert!(!manager.is_running());

        manager.start();
        manager.start();
        assert!(manager.is_running());
        assert_eq!(manager.inner.tasks.lock().len(), 2);

        manager.stop();
        assert!(!manager.is_running());
        manager.stop();
    }

    #[tokio::test]
    async fn clear_requires_confirmation_and_resets_count() {
        let (manager, remote, _) = manager(false);
        manager.add_pending_change(Operation::Update, EntityType::Tenant, json!({"id": "t1"}));
        manager.add_pending_change(Operation::Update, EntityType::Tenant, json!({"id": "t2"}));
        assert_eq!(manager.status().pending_count, 2);

        let dropped = manager
            .clear_pending_changes(ConfirmDiscard::DropAllPendingChanges)
            .unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(manager.status().pending_count, 0);
        assert!(manager.pending_changes().unwrap().is_empty());
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn collection_handles_are_shared() {
        let (manager, _, _) = manager(false);
        let a = manager.collection(EntityType::Tenant);
        let b = manager.collection(EntityType::Tenant);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.entity_type(), EntityType::Tenant);
    }

    #[tokio::test]
    async fn pending_changes_are_in_drain_order() {
        let (manager, _, _) = manager(false);
        manager.add_pending_change(Operation::Create, EntityType::Tenant, json!({"id": "t1"}));
        manager.add_pending_change(Operation::Update, EntityType::Tenant, json!({"id": "t1"}));

        let ops: Vec<_> = manager
            .pending_changes()
            .unwrap()
            .into_iter()
            .map(|c| c.operation)
            .collect();
        assert_eq!(ops, vec![Operation::Create, Operation::Update]);
    }

    #[tokio::test]
    async fn start_while_online_drains_existing_queue() {
        let (manager, remote, probe) = manager(true);
        manager.add_pending_change(Operation::Update, EntityType::Tenant, json!({"id": "t1"}));

        let mut rx = manager.subscribe_status();
        manager.start();
        tokio::time::timeout(Duration::from_secs(5), async {
            while rx.borrow_and_update().last_sync_time.is_none() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(remote.call_count(), 1);
        assert_eq!(manager.status().pending_count, 0);
        // The cycle's own probe is the only one.
        assert_eq!(probe.probe_count(), 1);
    }

    #[tokio::test]
    async fn idle_tick_checks_backend_once_without_syncing() {
        let (manager, remote, probe) = manager(true);

        manager.start();
        tokio::time::timeout(Duration::from_secs(5), async {
            while probe.probe_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(probe.probe_count(), 1);
        assert_eq!(remote.call_count(), 0);
        assert!(manager.is_online());
        assert!(manager.status().last_sync_time.is_none());
    }

    #[tokio::test]
    async fn network_drop_during_settle_cancels_probe() {
        let remote = Arc::new(MockRemote::new(EntityType::Tenant));
        let probe = Arc::new(MockProbe::new(true));
        let network = Arc::new(ManualNetworkSignal::new(false));
        let manager = SyncManager::new(
            SyncConfig::default()
                .with_settle_delay(Duration::from_millis(200))
                .with_probe_interval(Duration::from_secs(3600)),
            Arc::new(InMemoryStore::new()),
            RemoteRegistry::new().with(EntityType::Tenant, remote.clone()),
            probe.clone(),
            network.clone(),
        );
        manager.add_pending_change(Operation::Update, EntityType::Tenant, json!({"id": "t1"}));
        manager.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        network.go_online();
        tokio::time::sleep(Duration::from_millis(20)).await;
        network.go_offline();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(probe.probe_count(), 0);
        assert_eq!(remote.call_count(), 0);
        assert!(!manager.is_online());
        assert_eq!(manager.status().pending_count, 1);
    }
}
