//! Debounced connection quality monitoring.
//!
//! Platform connectivity signals arrive in bursts: dropping off wifi often
//! fires an offline event, a link type change and a downlink update within a
//! few milliseconds. [`NetworkMonitor`] absorbs each burst behind a short
//! debounce window and takes at most one [`ConnectionSample`] per window, so
//! downstream consumers (the policy engine above all) see one coherent
//! transition instead of three.
//!
//! # Architecture
//!
//! ```text
//! platform callback ──► notify_change() ──► debounce window ──► sample ──► watch
//!   (any number)            (coalesced)        (250ms)        (provider)  (dedup'd)
//! ```
//!
//! Consumers subscribe to a watch channel carrying [`ConnectionSnapshot`];
//! the channel only wakes them when the sampled state actually changed.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::telemetry::RuntimeMetrics;

use super::provider::NetworkInfoProvider;
use super::sample::{ConnectionQuality, ConnectionSample};

/// Default debounce window for bursts of platform signals.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Tuning knobs for [`NetworkMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How long to wait after the first signal of a burst before sampling.
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl MonitorConfig {
    /// Override the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// A sample plus its derived quality tier, published as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    /// The raw sample the tier was derived from.
    pub sample: ConnectionSample,
    /// Quality tier for this sample.
    pub quality: ConnectionQuality,
}

impl ConnectionSnapshot {
    fn from_sample(sample: ConnectionSample) -> Self {
        let quality = sample.quality();
        Self { sample, quality }
    }

    /// Whether the snapshot represents any connectivity.
    pub fn is_online(&self) -> bool {
        self.quality.is_online()
    }
}

/// Watches a [`NetworkInfoProvider`] and publishes debounced quality changes.
///
/// The monitor is passive between signals; embedders call
/// [`NetworkMonitor::notify_change`] from their platform callbacks and the
/// monitor does the rest. Signals landing inside an open debounce window are
/// folded into the sample taken when that window closes.
pub struct NetworkMonitor {
    provider: Arc<dyn NetworkInfoProvider>,
    config: MonitorConfig,
    snapshot_tx: watch::Sender<ConnectionSnapshot>,
    signal: Notify,
    metrics: Arc<RuntimeMetrics>,
}

impl NetworkMonitor {
    /// Create a monitor and take an immediate first sample so subscribers
    /// never observe a placeholder state.
    pub fn new(
        provider: Arc<dyn NetworkInfoProvider>,
        config: MonitorConfig,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        let initial = ConnectionSnapshot::from_sample(provider.connection_info().into_sample());
        info!(quality = %initial.quality, "network monitor starting");
        let (snapshot_tx, _) = watch::channel(initial);
        Self {
            provider,
            config,
            snapshot_tx,
            signal: Notify::new(),
            metrics,
        }
    }

    /// Subscribe to debounced connection snapshots.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// The most recently published quality tier.
    pub fn quality(&self) -> ConnectionQuality {
        self.snapshot_tx.borrow().quality
    }

    /// Whether the last sample showed any connectivity.
    pub fn is_online(&self) -> bool {
        self.snapshot_tx.borrow().is_online()
    }

    /// Report a platform-level change signal.
    ///
    /// Cheap and non-blocking; call it from any platform callback, as often
    /// as the platform fires. Bursts collapse into one sample.
    pub fn notify_change(&self) {
        self.signal.notify_one();
    }

    /// Sample the provider immediately, bypassing the debounce window.
    ///
    /// Used for the initial sample and available to embedders that need a
    /// synchronous read-through (for example right before a user-triggered
    /// refresh).
    pub fn sample_now(&self) -> ConnectionSnapshot {
        let snapshot = ConnectionSnapshot::from_sample(self.provider.connection_info().into_sample());
        self.metrics.sample_taken();
        self.publish(snapshot.clone());
        snapshot
    }

    fn publish(&self, snapshot: ConnectionSnapshot) {
        let metrics = Arc::clone(&self.metrics);
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            if current.quality != snapshot.quality {
                info!(from = %current.quality, to = %snapshot.quality, "connection quality changed");
                metrics.quality_changed();
            } else {
                debug!(quality = %snapshot.quality, "connection sample updated");
            }
            *current = snapshot;
            true
        });
    }

    /// Run the debounce loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("network monitor stopping");
                    break;
                }

                _ = self.signal.notified() => {
                    tokio::time::sleep(self.config.debounce).await;
                    // Signals that landed during the window are covered by
                    // the sample we are about to take; drop their permit so
                    // they do not trigger a second one.
                    let _ = self.signal.notified().now_or_never();
                    self.sample_now();
                }
            }
        }
    }
}
