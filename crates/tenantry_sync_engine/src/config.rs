//! Configuration for the sync manager.

use std::time::Duration;

/// Local store key of the pending-change queue.
pub const DEFAULT_QUEUE_KEY: &str = "pending_changes";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between a network-reachable edge and the backend probe that
    /// may declare the system online.
    pub settle_delay: Duration,
    /// Interval of the periodic backend probe. Also the retry interval for
    /// entries that failed in a previous cycle.
    pub probe_interval: Duration,
    /// Upper bound for one backend probe; a probe that takes longer counts
    /// as unreachable.
    pub probe_timeout: Duration,
    /// Upper bound for one remote create/update/delete call.
    pub request_timeout: Duration,
    /// Local store key holding the pending queue.
    pub queue_key: String,
}

impl SyncConfig {
    /// Creates a configuration with the default timings.
    pub fn new() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }

    /// Sets the reconnect settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the periodic probe interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the queue key.
    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.settle_delay, Duration::from_secs(2));
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert!(config.probe_timeout < Duration::from_secs(2));
        assert_eq!(config.queue_key, "pending_changes");
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_settle_delay(Duration::from_millis(10))
            .with_probe_interval(Duration::from_millis(50))
            .with_probe_timeout(Duration::from_millis(5))
            .with_request_timeout(Duration::from_millis(20))
            .with_queue_key("outbox");

        assert_eq!(config.settle_delay, Duration::from_millis(10));
        assert_eq!(config.probe_interval, Duration::from_millis(50));
        assert_eq!(config.probe_timeout, Duration::from_millis(5));
        assert_eq!(config.request_timeout, Duration::from_millis(20));
        assert_eq!(config.queue_key, "outbox");
    }
}
