//! Atomic counters recorded by the runtime components.

use std::sync::atomic::{AtomicU64, Ordering};

use super::TelemetrySnapshot;

/// Lock-free counters shared across every runtime component.
///
/// One instance is created by the runtime and handed out as `Arc`. All
/// methods use relaxed ordering; the counters are statistics, not
/// synchronization points.
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    /// Connection samples taken after debounce windows.
    samples_taken: AtomicU64,
    /// Connection quality tier transitions.
    quality_changes: AtomicU64,
    /// Policy recomputations (one per distinct input change).
    policy_recomputes: AtomicU64,
    /// Reads that launched a real network request.
    dedup_launched: AtomicU64,
    /// Reads collapsed onto an in-flight or just-settled request.
    dedup_collapsed: AtomicU64,
    /// Reads served from a fresh cache record.
    cache_hits: AtomicU64,
    /// Reads that found no usable cache record.
    cache_misses: AtomicU64,
    /// Reads served from an expired record because the client was offline.
    cache_stale_served: AtomicU64,
    /// Records dropped to respect the item cap.
    cache_evictions: AtomicU64,
    /// Records removed by the expiry sweeper.
    cache_expired: AtomicU64,
    /// Network fetch attempts repeated after a transient failure.
    fetch_retries: AtomicU64,
    /// Mutations applied directly against the backend.
    mutations_applied: AtomicU64,
    /// Mutations accepted into the offline queue.
    mutations_queued: AtomicU64,
    /// Queued actions replayed successfully.
    replay_succeeded: AtomicU64,
    /// Queued actions that exhausted their attempts.
    replay_failed: AtomicU64,
    /// Push events delivered through a throttle.
    throttle_emitted: AtomicU64,
    /// Pending push events overwritten before they could be delivered.
    throttle_suppressed: AtomicU64,
}

impl RuntimeMetrics {
    /// Create a fresh set of counters, all zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_taken(&self) {
        self.samples_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn quality_changed(&self) {
        self.quality_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn policy_recomputed(&self) {
        self.policy_recomputes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dedup_launched(&self) {
        self.dedup_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dedup_collapsed(&self) {
        self.dedup_collapsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_stale_served(&self) {
        self.cache_stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_evicted(&self, count: u64) {
        self.cache_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn cache_expired(&self, count: u64) {
        self.cache_expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn fetch_retried(&self) {
        self.fetch_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mutation_applied(&self) {
        self.mutations_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mutation_queued(&self) {
        self.mutations_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replay_succeeded(&self) {
        self.replay_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replay_failed(&self) {
        self.replay_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn throttle_emitted(&self) {
        self.throttle_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn throttle_suppressed(&self) {
        self.throttle_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Capture a point-in-time copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            samples_taken: self.samples_taken.load(Ordering::Relaxed),
            quality_changes: self.quality_changes.load(Ordering::Relaxed),
            policy_recomputes: self.policy_recomputes.load(Ordering::Relaxed),
            dedup_launched: self.dedup_launched.load(Ordering::Relaxed),
            dedup_collapsed: self.dedup_collapsed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_stale_served: self.cache_stale_served.load(Ordering::Relaxed),
            cache_evictions: self.cache_evictions.load(Ordering::Relaxed),
            cache_expired: self.cache_expired.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
            mutations_applied: self.mutations_applied.load(Ordering::Relaxed),
            mutations_queued: self.mutations_queued.load(Ordering::Relaxed),
            replay_succeeded: self.replay_succeeded.load(Ordering::Relaxed),
            replay_failed: self.replay_failed.load(Ordering::Relaxed),
            throttle_emitted: self.throttle_emitted.load(Ordering::Relaxed),
            throttle_suppressed: self.throttle_suppressed.load(Ordering::Relaxed),
        }
    }
}
