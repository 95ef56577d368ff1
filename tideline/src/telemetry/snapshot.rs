//! Point-in-time copies of the runtime counters.

use std::fmt;

/// A consistent-enough copy of all runtime counters.
///
/// Values are loaded individually, so a snapshot taken while the runtime is
/// busy may be skewed by a few events. That is fine for dashboards and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub samples_taken: u64,
    pub quality_changes: u64,
    pub policy_recomputes: u64,
    pub dedup_launched: u64,
    pub dedup_collapsed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_stale_served: u64,
    pub cache_evictions: u64,
    pub cache_expired: u64,
    pub fetch_retries: u64,
    pub mutations_applied: u64,
    pub mutations_queued: u64,
    pub replay_succeeded: u64,
    pub replay_failed: u64,
    pub throttle_emitted: u64,
    pub throttle_suppressed: u64,
}

impl TelemetrySnapshot {
    /// Fraction of reads answered from a fresh cache record, in `0.0..=1.0`.
    ///
    /// Returns 0.0 when no reads have been observed yet.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses + self.cache_stale_served;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    /// Fraction of network reads absorbed by deduplication, in `0.0..=1.0`.
    pub fn dedup_collapse_rate(&self) -> f64 {
        let total = self.dedup_launched + self.dedup_collapsed;
        if total == 0 {
            return 0.0;
        }
        self.dedup_collapsed as f64 / total as f64
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache {}/{} hits ({:.0}%), dedup collapsed {} of {}, queued {}, replayed {} ok / {} failed",
            self.cache_hits,
            self.cache_hits + self.cache_misses + self.cache_stale_served,
            self.cache_hit_rate() * 100.0,
            self.dedup_collapsed,
            self.dedup_launched + self.dedup_collapsed,
            self.mutations_queued,
            self.replay_succeeded,
            self.replay_failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_empty() {
        let snapshot = TelemetrySnapshot::default();
        assert_eq!(snapshot.cache_hit_rate(), 0.0);
        assert_eq!(snapshot.dedup_collapse_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_stale_as_non_hit() {
        let snapshot = TelemetrySnapshot {
            cache_hits: 6,
            cache_misses: 2,
            cache_stale_served: 2,
            ..Default::default()
        };
        assert!((snapshot.cache_hit_rate() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_collapse_rate() {
        let snapshot = TelemetrySnapshot {
            dedup_launched: 1,
            dedup_collapsed: 3,
            ..Default::default()
        };
        assert!((snapshot.dedup_collapse_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_formats_summary() {
        let snapshot = TelemetrySnapshot {
            cache_hits: 5,
            cache_misses: 5,
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.contains("5/10 hits"));
        assert!(text.contains("50%"));
    }
}
