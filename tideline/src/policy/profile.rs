//! Performance policy profiles and derivation.
//!
//! A [`PerformancePolicy`] bundles every tunable the client adapts: page
//! sizes, cache freshness, retry behavior, UI hints and realtime gating.
//! [`derive_policy`] maps a [`PolicyInputs`] triple onto a policy, starting
//! from one of three base profiles and applying the data saver and memory
//! pressure overrides on top.
//!
//! Derivation is a pure function: no clocks, no channels, no state. Equal
//! inputs produce equal policies, which is what makes the engine's
//! memoization and the UI's change detection trivial.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::netinfo::{ConnectionQuality, ConnectionSnapshot, MemoryPressure};

/// The complete set of adaptive tunables.
///
/// Consumers treat a policy as an immutable value: when conditions change
/// they receive a whole new one rather than individual field updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformancePolicy {
    /// Records requested per page on list reads.
    pub page_size: u32,
    /// How long a cache record is considered fresh enough to serve without
    /// revalidation.
    pub stale_window: Duration,
    /// How long a cache record is retained at all.
    pub cache_window: Duration,
    /// Transient fetch failures retried before surfacing an error.
    pub retry_count: u32,
    /// Base delay between fetch retries; doubles per attempt.
    pub retry_delay: Duration,
    /// UI hint: whether decorative animation is worth the frames.
    pub animations_enabled: bool,
    /// Whether speculative reads are allowed at all.
    pub prefetch_enabled: bool,
    /// Whether live push subscriptions should deliver.
    pub realtime_enabled: bool,
    /// Minimum spacing between delivered push events per subscription.
    pub throttle_interval: Duration,
    /// Suggested interval for poll-based fallbacks.
    pub polling_interval: Duration,
    /// UI hint: rows to render beyond the visible window of virtual lists.
    pub virtual_list_overscan: u32,
    /// Cap on locally cached records.
    pub max_cache_items: u32,
}

impl PerformancePolicy {
    /// Base profile for slow or absent connectivity.
    ///
    /// Everything is frugal: small pages, long cache tolerance, a single
    /// retry, realtime off.
    pub fn slow_profile() -> Self {
        Self {
            page_size: 10,
            stale_window: Duration::from_secs(600),
            cache_window: Duration::from_secs(1_800),
            retry_count: 1,
            retry_delay: Duration::from_millis(3_000),
            animations_enabled: false,
            prefetch_enabled: false,
            realtime_enabled: false,
            throttle_interval: Duration::from_millis(5_000),
            polling_interval: Duration::from_secs(120),
            virtual_list_overscan: 2,
            max_cache_items: 50,
        }
    }

    /// Base profile for workable but constrained connectivity.
    ///
    /// Also the profile every unclassifiable situation falls back to.
    pub fn medium_profile() -> Self {
        Self {
            page_size: 25,
            stale_window: Duration::from_secs(300),
            cache_window: Duration::from_secs(900),
            retry_count: 2,
            retry_delay: Duration::from_millis(1_000),
            animations_enabled: true,
            prefetch_enabled: false,
            realtime_enabled: true,
            throttle_interval: Duration::from_millis(2_000),
            polling_interval: Duration::from_secs(60),
            virtual_list_overscan: 5,
            max_cache_items: 100,
        }
    }

    /// Base profile for healthy connectivity.
    pub fn fast_profile() -> Self {
        Self {
            page_size: 50,
            stale_window: Duration::from_secs(120),
            cache_window: Duration::from_secs(300),
            retry_count: 3,
            retry_delay: Duration::from_millis(1_000),
            animations_enabled: true,
            prefetch_enabled: true,
            realtime_enabled: true,
            throttle_interval: Duration::from_millis(500),
            polling_interval: Duration::from_secs(30),
            virtual_list_overscan: 10,
            max_cache_items: 200,
        }
    }
}

impl Default for PerformancePolicy {
    fn default() -> Self {
        Self::medium_profile()
    }
}

/// The three inputs a policy is derived from.
///
/// Equality on this struct is the engine's memoization key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyInputs {
    /// Connection quality tier.
    pub quality: ConnectionQuality,
    /// Memory pressure tier.
    pub pressure: MemoryPressure,
    /// User data saver preference.
    pub save_data: bool,
}

impl PolicyInputs {
    /// Combine the two monitor outputs into a derivation input.
    pub fn from_parts(snapshot: &ConnectionSnapshot, pressure: MemoryPressure) -> Self {
        Self {
            quality: snapshot.quality,
            pressure,
            save_data: snapshot.sample.save_data,
        }
    }
}

impl Default for PolicyInputs {
    fn default() -> Self {
        Self {
            quality: ConnectionQuality::Medium,
            pressure: MemoryPressure::Low,
            save_data: false,
        }
    }
}

/// Derive the policy for a set of inputs.
///
/// Selection order:
///
/// 1. Data saver on always selects the slow profile, whatever the link
///    looks like. The user asked for frugality; quality alone does not
///    override that.
/// 2. Otherwise the quality tier selects its profile, with offline sharing
///    the slow one.
/// 3. High memory pressure then disables prefetch and halves the cache item
///    cap and list overscan.
/// 4. Realtime is only ever enabled while online.
pub fn derive_policy(inputs: PolicyInputs) -> PerformancePolicy {
    let mut policy = if inputs.save_data {
        PerformancePolicy::slow_profile()
    } else {
        match inputs.quality {
            ConnectionQuality::Fast => PerformancePolicy::fast_profile(),
            ConnectionQuality::Medium => PerformancePolicy::medium_profile(),
            ConnectionQuality::Slow | ConnectionQuality::Offline => {
                PerformancePolicy::slow_profile()
            }
        }
    };

    if inputs.pressure == MemoryPressure::High {
        policy.prefetch_enabled = false;
        policy.max_cache_items = (policy.max_cache_items / 2).max(1);
        policy.virtual_list_overscan = (policy.virtual_list_overscan / 2).max(1);
    }

    policy.realtime_enabled = policy.realtime_enabled && inputs.quality.is_online();

    policy
}
