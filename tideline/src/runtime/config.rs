//! Top-level runtime configuration.
//!
//! [`RuntimeConfig`] combines the tuning knobs of every component behind one
//! surface so embedders configure the runtime in one place and the pieces
//! stay consistent (one namespace, one replay policy, one monitor setup).

use std::time::Duration;

use crate::dedup::DedupConfig;
use crate::netinfo::{MonitorConfig, DEFAULT_MEMORY_POLL_INTERVAL};
use crate::queue::ReplayConfig;
use crate::store::{StoreConfig, DEFAULT_NAMESPACE};

/// Configuration for [`TidelineRuntime::start`](super::TidelineRuntime::start).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Key prefix under which the store and queue persist their documents.
    ///
    /// Overrides the namespace inside [`RuntimeConfig::store`]; two runtimes
    /// sharing a storage backend must use distinct namespaces.
    pub namespace: String,

    /// Connection monitor tuning.
    pub monitor: MonitorConfig,

    /// Cache store tuning.
    pub store: StoreConfig,

    /// Read deduplication tuning.
    pub dedup: DedupConfig,

    /// Offline queue replay tuning.
    pub replay: ReplayConfig,

    /// Interval between memory pressure polls.
    pub memory_poll_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            monitor: MonitorConfig::default(),
            store: StoreConfig::default(),
            dedup: DedupConfig::default(),
            replay: ReplayConfig::default(),
            memory_poll_interval: DEFAULT_MEMORY_POLL_INTERVAL,
        }
    }
}

impl RuntimeConfig {
    /// Override the persistence namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Override the connection monitor tuning.
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    /// Override the cache store tuning.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Override the read deduplication tuning.
    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }

    /// Override the replay tuning.
    pub fn with_replay(mut self, replay: ReplayConfig) -> Self {
        self.replay = replay;
        self
    }

    /// Override the memory poll interval.
    pub fn with_memory_poll_interval(mut self, interval: Duration) -> Self {
        self.memory_poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netinfo::DEFAULT_DEBOUNCE;
    use crate::queue::DEFAULT_MAX_ATTEMPTS;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.namespace, "tideline");
        assert_eq!(config.monitor.debounce, DEFAULT_DEBOUNCE);
        assert_eq!(config.replay.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.memory_poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_overrides() {
        let config = RuntimeConfig::default()
            .with_namespace("bridge-display")
            .with_monitor(MonitorConfig::default().with_debounce(Duration::from_millis(50)))
            .with_replay(ReplayConfig::default().with_max_attempts(5))
            .with_memory_poll_interval(Duration::from_secs(30));

        assert_eq!(config.namespace, "bridge-display");
        assert_eq!(config.monitor.debounce, Duration::from_millis(50));
        assert_eq!(config.replay.max_attempts, 5);
        assert_eq!(config.memory_poll_interval, Duration::from_secs(30));
    }
}
