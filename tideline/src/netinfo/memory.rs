//! Device memory pressure estimation.
//!
//! Memory pressure is a second, independent input to the performance policy:
//! a phone on fast wifi may still be short on RAM, and the policy responds by
//! shrinking caches and disabling prefetch rather than by slowing the network
//! side down.
//!
//! Estimation mirrors the connection side: a platform adapter
//! ([`MemoryInfoProvider`]) exposes raw signals, a pure classifier folds them
//! into a [`MemoryPressure`] tier, and a small polling monitor publishes tier
//! changes on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Heap usage at or above this fraction classifies as [`MemoryPressure::High`].
pub const HIGH_USED_FRACTION: f64 = 0.9;

/// Heap usage at or above this fraction classifies as [`MemoryPressure::Medium`].
pub const MEDIUM_USED_FRACTION: f64 = 0.7;

/// Devices with less total memory than this many GB classify as high pressure.
pub const SCARCE_DEVICE_MEMORY_GB: f64 = 2.0;

/// Devices with less total memory than this many GB classify as medium pressure.
pub const MODEST_DEVICE_MEMORY_GB: f64 = 4.0;

/// Default interval between memory pressure polls.
pub const DEFAULT_MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Device resource pressure tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    /// Plenty of headroom, or nothing reported.
    #[default]
    Low,
    /// Constrained device or noticeably full heap.
    Medium,
    /// Imminent eviction territory; caches must shrink.
    High,
}

impl MemoryPressure {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryPressure::Low => "low",
            MemoryPressure::Medium => "medium",
            MemoryPressure::High => "high",
        }
    }
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw memory signals from the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemorySample {
    /// Total device memory in GB, if the platform reports it.
    pub device_memory_gb: Option<f64>,
    /// Fraction of the heap budget currently in use, in `0.0..=1.0`.
    pub used_fraction: Option<f64>,
}

impl MemorySample {
    /// Classify this sample into a pressure tier.
    ///
    /// Live heap usage wins over the static device capability; a sample with
    /// neither signal classifies as [`MemoryPressure::Low`] so that blind
    /// platforms are not penalized.
    pub fn pressure(&self) -> MemoryPressure {
        if let Some(used) = self.used_fraction {
            return if used >= HIGH_USED_FRACTION {
                MemoryPressure::High
            } else if used >= MEDIUM_USED_FRACTION {
                MemoryPressure::Medium
            } else {
                MemoryPressure::Low
            };
        }

        if let Some(total) = self.device_memory_gb {
            return if total < SCARCE_DEVICE_MEMORY_GB {
                MemoryPressure::High
            } else if total < MODEST_DEVICE_MEMORY_GB {
                MemoryPressure::Medium
            } else {
                MemoryPressure::Low
            };
        }

        MemoryPressure::Low
    }
}

/// Source of memory signals, implemented per platform.
pub trait MemoryInfoProvider: Send + Sync {
    /// Read the platform's current memory signals.
    fn memory_sample(&self) -> MemorySample;
}

/// A [`MemoryInfoProvider`] backed by shared mutable state.
///
/// The memory twin of [`super::SharedNetworkInfo`]: embedders with
/// callback-style platforms write the latest sample here.
#[derive(Debug, Clone, Default)]
pub struct SharedMemoryInfo {
    inner: Arc<RwLock<MemorySample>>,
}

impl SharedMemoryInfo {
    pub fn new(initial: MemorySample) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn set(&self, sample: MemorySample) {
        *self.inner.write() = sample;
    }
}

impl MemoryInfoProvider for SharedMemoryInfo {
    fn memory_sample(&self) -> MemorySample {
        *self.inner.read()
    }
}

/// A fixed sample doubles as a provider, convenient for embedders whose
/// platform reports memory once at startup.
impl MemoryInfoProvider for MemorySample {
    fn memory_sample(&self) -> MemorySample {
        *self
    }
}

/// Polls a [`MemoryInfoProvider`] and publishes pressure tier changes.
///
/// Memory signals have no platform change event to hook, so the monitor
/// polls on a fixed interval. The watch channel only wakes subscribers when
/// the tier actually moves.
pub struct MemoryMonitor {
    provider: Arc<dyn MemoryInfoProvider>,
    poll_interval: Duration,
    pressure_tx: watch::Sender<MemoryPressure>,
}

impl MemoryMonitor {
    /// Create a monitor, classifying one sample immediately so subscribers
    /// start with a real value.
    pub fn new(provider: Arc<dyn MemoryInfoProvider>, poll_interval: Duration) -> Self {
        let initial = provider.memory_sample().pressure();
        let (pressure_tx, _) = watch::channel(initial);
        Self {
            provider,
            poll_interval,
            pressure_tx,
        }
    }

    /// Subscribe to pressure tier changes.
    pub fn subscribe(&self) -> watch::Receiver<MemoryPressure> {
        self.pressure_tx.subscribe()
    }

    /// The most recently classified pressure tier.
    pub fn pressure(&self) -> MemoryPressure {
        *self.pressure_tx.borrow()
    }

    /// Sample and classify once, publishing if the tier moved.
    pub fn poll_once(&self) {
        let pressure = self.provider.memory_sample().pressure();
        self.pressure_tx.send_if_modified(|current| {
            if *current == pressure {
                return false;
            }
            debug!(from = %current, to = %pressure, "memory pressure changed");
            *current = pressure;
            true
        });
    }

    /// Run the polling loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("memory monitor stopping");
                    break;
                }

                _ = ticker.tick() => {
                    self.poll_once();
                }
            }
        }
    }
}
