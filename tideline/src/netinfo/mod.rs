//! Connection and memory awareness.
//!
//! This module turns raw platform signals into the two tier inputs the
//! policy engine consumes:
//!
//! - [`NetworkMonitor`] debounces connectivity signals and classifies each
//!   sample into a [`ConnectionQuality`] tier.
//! - [`MemoryMonitor`] polls memory signals and classifies them into a
//!   [`MemoryPressure`] tier.
//!
//! Both monitors publish on watch channels that only wake subscribers on
//! real changes, so the rest of the runtime can be written as "react to tier
//! transitions" without its own change detection.
//!
//! # Example
//!
//! ```ignore
//! use tideline::netinfo::{ConnectionInfo, MonitorConfig, NetworkMonitor, SharedNetworkInfo};
//!
//! let platform = SharedNetworkInfo::new(ConnectionInfo::default());
//! let monitor = NetworkMonitor::new(Arc::new(platform.clone()), MonitorConfig::default(), metrics);
//!
//! // Wire your platform's callbacks:
//! //   on change: platform.update(..); monitor.notify_change();
//! let mut quality_rx = monitor.subscribe();
//! ```

mod memory;
mod monitor;
mod provider;
mod sample;

pub use memory::{
    MemoryInfoProvider, MemoryMonitor, MemoryPressure, MemorySample, SharedMemoryInfo,
    DEFAULT_MEMORY_POLL_INTERVAL, HIGH_USED_FRACTION, MEDIUM_USED_FRACTION,
    MODEST_DEVICE_MEMORY_GB, SCARCE_DEVICE_MEMORY_GB,
};
pub use monitor::{ConnectionSnapshot, MonitorConfig, NetworkMonitor, DEFAULT_DEBOUNCE};
pub use provider::{ConnectionInfo, NetworkInfoProvider, SharedNetworkInfo};
pub use sample::{
    ConnectionQuality, ConnectionSample, EffectiveType, MEDIUM_DOWNLINK_MBPS, MEDIUM_RTT_MS,
    SLOW_DOWNLINK_MBPS, SLOW_RTT_MS,
};
