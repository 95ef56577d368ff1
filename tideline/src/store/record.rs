//! Cached record model.
//!
//! A [`CacheRecord`] is what the store persists per key: the payload plus
//! the timestamps needed to answer the two questions the read path asks.
//! Freshness ("can I serve this without revalidating?") is judged against
//! the *policy's* stale window at read time; expiry ("should this still be
//! retained at all?") is judged against the record's own ttl, fixed when it
//! was stored. A record between the two is stale-but-retained: revalidated
//! when online, served as-is when offline.
//!
//! All judgments take the current time as an explicit argument so tests can
//! pin the clock.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One cached payload with its retention metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// The cache key this record was stored under.
    pub key: String,
    /// The cached payload, shaped by whatever was fetched.
    pub payload: serde_json::Value,
    /// Unix milliseconds when the record was stored.
    pub stored_at_ms: i64,
    /// Retention window in milliseconds, fixed at store time.
    pub ttl_ms: u64,
}

impl CacheRecord {
    /// Create a record stored at `now_ms` with the given retention window.
    pub fn new(
        key: impl Into<String>,
        payload: serde_json::Value,
        ttl: Duration,
        now_ms: i64,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            stored_at_ms: now_ms,
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Age of the record at `now_ms`. Clock regressions count as zero age.
    pub fn age(&self, now_ms: i64) -> Duration {
        let millis = (now_ms - self.stored_at_ms).max(0) as u64;
        Duration::from_millis(millis)
    }

    /// Whether the record is young enough to serve without revalidation.
    pub fn is_fresh(&self, stale_window: Duration, now_ms: i64) -> bool {
        self.age(now_ms) < stale_window
    }

    /// Whether the record has outlived its retention window.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.age(now_ms) >= Duration::from_millis(self.ttl_ms)
    }
}
