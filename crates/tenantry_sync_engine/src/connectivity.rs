//! Network and backend reachability tracking.

use crate::remote::BackendProbe;
use crate::status::StatusReporter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// An edge reported by the platform's network signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The network became reachable.
    Online,
    /// The network was lost.
    Offline,
}

/// Source of OS-level network reachability edges.
pub trait NetworkSignal: Send + Sync {
    /// Subscribes to online/offline edges.
    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent>;

    /// Returns the current reachability, used to resynchronise after
    /// missed events.
    fn is_reachable(&self) -> bool;
}

/// A network signal driven by the host application (or a test).
///
/// Only edges are broadcast: reporting the same state twice emits nothing.
#[derive(Debug)]
pub struct ManualNetworkSignal {
    tx: broadcast::Sender<NetworkEvent>,
    reachable: AtomicBool,
}

impl ManualNetworkSignal {
    /// Creates a signal with the given initial state.
    pub fn new(reachable: bool) -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self {
            tx,
            reachable: AtomicBool::new(reachable),
        }
    }

    /// Reports that the network is reachable.
    pub fn go_online(&self) {
        self.set(true);
    }

    /// Reports that the network was lost.
    pub fn go_offline(&self) {
        self.set(false);
    }

    fn set(&self, reachable: bool) {
        if self.reachable.swap(reachable, Ordering::SeqCst) != reachable {
            let event = if reachable {
                NetworkEvent::Online
            } else {
                NetworkEvent::Offline
            };
            // No subscribers is fine: the state is still recorded.
            let _ = self.tx.send(event);
        }
    }
}

impl NetworkSignal for ManualNetworkSignal {
    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.tx.subscribe()
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// A change of the combined online state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Both network and backend became reachable.
    CameOnline,
    /// Network or backend became unreachable.
    WentOffline,
}

/// Result of one backend probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Whether the backend answered in time.
    pub reachable: bool,
    /// Edge of the combined online state caused by this probe.
    pub transition: Option<Transition>,
}

#[derive(Debug, Default)]
struct Reachability {
    network: bool,
    backend: bool,
}

impl Reachability {
    fn online(&self) -> bool {
        self.network && self.backend
    }
}

/// Tracks network and backend reachability and derives `is_online`.
///
/// `is_online` is the logical AND of both signals. Losing the network
/// also clears the backend flag, so coming back requires a fresh probe.
pub struct ConnectivityMonitor {
    state: Mutex<Reachability>,
    probe: Arc<dyn BackendProbe>,
    probe_timeout: Duration,
    status: Arc<StatusReporter>,
}

impl ConnectivityMonitor {
    /// Creates a monitor that starts fully offline.
    pub fn new(
        probe: Arc<dyn BackendProbe>,
        probe_timeout: Duration,
        status: Arc<StatusReporter>,
    ) -> Self {
        Self {
            state: Mutex::new(Reachability::default()),
            probe,
            probe_timeout,
            status,
        }
    }

    /// Returns true if both network and backend are reachable.
    pub fn is_online(&self) -> bool {
        self.state.lock().online()
    }

    /// Returns the network flag.
    pub fn network_reachable(&self) -> bool {
        self.state.lock().network
    }

    /// Returns the backend flag from the last probe.
    pub fn backend_reachable(&self) -> bool {
        self.state.lock().backend
    }

    /// Records the network signal.
    pub fn set_network(&self, reachable: bool) -> Option<Transition> {
        self.apply(|s| {
            s.network = reachable;
            if !reachable {
                s.backend = false;
            }
        })
    }

    /// Records a backend probe result.
    pub fn set_backend(&self, reachable: bool) -> Option<Transition> {
        self.apply(|s| s.backend = reachable)
    }

    /// Probes the backend, bounded by the probe timeout, and records the result.
    pub async fn probe_backend(&self) -> ProbeOutcome {
        let reachable = tokio::time::timeout(self.probe_timeout, self.probe.probe())
            .await
            .unwrap_or_else(|_| {
                tracing::debug!(timeout = ?self.probe_timeout, "backend probe timed out");
                false
            });
        let transition = self.set_backend(reachable);
        ProbeOutcome {
            reachable,
            transition,
        }
    }

    fn apply(&self, f: impl FnOnce(&mut Reachability)) -> Option<Transition> {
        let (before, after) = {
            let mut state = self.state.lock();
            let before = state.online();
            f(&mut state);
            (before, state.online())
        };
        self.status.set_online(after);

        match (before, after) {
            (false, true) => {
                tracing::info!("connectivity restored");
                Some(Transition::CameOnline)
            }
            (true, false) => {
                tracing::info!("connectivity lost");
                Some(Transition::WentOffline)
            }
            _ => None,
        }
    }
}
