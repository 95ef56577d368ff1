//! Platform adapters for connection information.
//!
//! The runtime never talks to a platform API directly. Embedders implement
//! [`NetworkInfoProvider`] over whatever their host exposes (browser network
//! information, OS link state, a hardware modem) and hand it to the monitor.
//! [`SharedNetworkInfo`] is a ready-made implementation backed by a lock,
//! useful both for embedders that receive push-style platform callbacks and
//! for tests.

use std::sync::Arc;

use parking_lot::RwLock;

use super::sample::{ConnectionSample, EffectiveType};

/// Raw, capability-checked connection signals from the platform.
///
/// Every field is optional; platforms report wildly different subsets.
/// [`ConnectionInfo::into_sample`] fills the gaps with conservative defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionInfo {
    /// Whether the platform believes it has connectivity.
    pub online: Option<bool>,
    /// Coarse link type string, already parsed.
    pub effective_type: Option<EffectiveType>,
    /// Estimated downlink bandwidth in Mbps.
    pub downlink_mbps: Option<f64>,
    /// Estimated round-trip time in milliseconds.
    pub rtt_ms: Option<u32>,
    /// Data saver preference.
    pub save_data: Option<bool>,
}

impl ConnectionInfo {
    /// Normalize into a [`ConnectionSample`].
    ///
    /// A missing online flag is treated as online (the signal exists on
    /// every platform that can report being offline), a missing link type as
    /// unknown and a missing data saver preference as disabled.
    pub fn into_sample(self) -> ConnectionSample {
        ConnectionSample {
            online: self.online.unwrap_or(true),
            effective_type: self.effective_type.unwrap_or_default(),
            downlink_mbps: self.downlink_mbps,
            rtt_ms: self.rtt_ms,
            save_data: self.save_data.unwrap_or(false),
        }
    }
}

/// Source of connection signals, implemented per platform.
///
/// Reads must be cheap and non-blocking; the monitor calls this from its
/// debounce loop every time a platform change signal fires.
pub trait NetworkInfoProvider: Send + Sync {
    /// Read the platform's current connection signals.
    fn connection_info(&self) -> ConnectionInfo;
}

/// A [`NetworkInfoProvider`] backed by shared mutable state.
///
/// Embedders whose platform delivers connection changes as callbacks write
/// the latest signals here, then nudge the monitor. Cloning shares the
/// underlying state.
///
/// # Example
///
/// ```ignore
/// let info = SharedNetworkInfo::new(ConnectionInfo::default());
///
/// // Platform callback fires:
/// info.update(|i| {
///     i.online = Some(false);
/// });
/// monitor.notify_change();
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedNetworkInfo {
    inner: Arc<RwLock<ConnectionInfo>>,
}

impl SharedNetworkInfo {
    pub fn new(initial: ConnectionInfo) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Replace the stored signals wholesale.
    pub fn set(&self, info: ConnectionInfo) {
        *self.inner.write() = info;
    }

    /// Mutate the stored signals in place.
    pub fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ConnectionInfo),
    {
        mutate(&mut self.inner.write());
    }
}

impl NetworkInfoProvider for SharedNetworkInfo {
    fn connection_info(&self) -> ConnectionInfo {
        self.inner.read().clone()
    }
}
