//! Local record caching.
//!
//! The cache store is the offline half of the read path: every successful
//! fetch is written through it, every read consults it, and while offline
//! it is the only source there is. [`CacheStore`] keeps an in-memory index
//! (key, timestamps, access order) and writes payloads through a
//! [`Storage`] backend, one document per record plus one index document.
//! On startup the index document is loaded back, so cached data survives
//! restarts; payloads are only read from the backend when a key is
//! actually requested.
//!
//! # Architecture
//!
//! ```text
//!              ┌────────────── CacheStore ──────────────┐
//!  get/put ──► │ index (in memory)   payloads (backend) │ ──► Storage
//!              │   key → meta          one doc per key  │
//!              └───────────────┬────────────────────────┘
//!                              │ background
//!                              ▼
//!                        expiry sweeper
//! ```
//!
//! The store never judges freshness on its own: `get` returns whatever
//! record exists, expired or not, and the caller applies its policy. That
//! is what makes serve-stale-while-offline possible. Expired records leave
//! the store only through the sweeper or by being overwritten.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::storage::Storage;
use crate::telemetry::RuntimeMetrics;

mod record;

pub use record::CacheRecord;

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default cap on cached records, before any policy override.
pub const DEFAULT_MAX_ITEMS: u32 = 200;

/// Default storage key namespace.
pub const DEFAULT_NAMESPACE: &str = "tideline";

/// Tuning knobs for [`CacheStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Prefix for every storage key this store writes.
    pub namespace: String,
    /// How often the background sweeper purges expired records.
    pub sweep_interval: Duration,
    /// Initial cap on cached records; the live policy adjusts it later.
    pub max_items: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl StoreConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_items(mut self, max_items: u32) -> Self {
        self.max_items = max_items;
        self
    }
}

/// Result of an expiry sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    /// Expired records removed.
    pub records_removed: usize,
    /// Wall time the sweep took, in milliseconds.
    pub duration_ms: u64,
}

impl fmt::Display for SweepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sweep: removed {} expired records in {}ms",
            self.records_removed, self.duration_ms
        )
    }
}

/// Index metadata for one cached record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    key: String,
    stored_at_ms: i64,
    ttl_ms: u64,
    /// Monotonic access order; larger means more recently used.
    access_seq: u64,
}

impl IndexEntry {
    fn is_expired(&self, now_ms: i64) -> bool {
        (now_ms - self.stored_at_ms).max(0) as u64 >= self.ttl_ms
    }
}

/// Evict least-recently-accessed entries until the cap holds.
fn evict_overflow_locked(index: &mut HashMap<String, IndexEntry>, cap: usize) -> Vec<String> {
    let mut evicted = Vec::new();
    while index.len() > cap {
        let victim = index
            .values()
            .min_by_key(|e| e.access_seq)
            .map(|e| e.key.clone());
        match victim {
            Some(key) => {
                index.remove(&key);
                evicted.push(key);
            }
            None => break,
        }
    }
    evicted
}

/// TTL'd, LRU-capped record store over a [`Storage`] backend.
pub struct CacheStore {
    storage: Arc<dyn Storage>,
    config: StoreConfig,
    index: Mutex<HashMap<String, IndexEntry>>,
    access_counter: AtomicU64,
    max_items: AtomicU32,
    /// Serializes index document writes so an older snapshot can never
    /// overwrite a newer one.
    persist_lock: tokio::sync::Mutex<()>,
    metrics: Arc<RuntimeMetrics>,
}

impl CacheStore {
    /// Open the store, loading any persisted index.
    ///
    /// A corrupt index document is logged and discarded; the store starts
    /// empty rather than failing. Orphaned payload documents are harmless
    /// and get overwritten on their next put.
    pub async fn open(
        storage: Arc<dyn Storage>,
        config: StoreConfig,
        metrics: Arc<RuntimeMetrics>,
    ) -> Result<Self, SyncError> {
        let index_key = format!("{}/cache/index", config.namespace);
        let entries: Vec<IndexEntry> = match storage.get(&index_key).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "corrupt cache index, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let next_seq = entries.iter().map(|e| e.access_seq).max().unwrap_or(0) + 1;
        let index: HashMap<String, IndexEntry> =
            entries.into_iter().map(|e| (e.key.clone(), e)).collect();
        info!(records = index.len(), namespace = %config.namespace, "cache store opened");

        Ok(Self {
            storage,
            max_items: AtomicU32::new(config.max_items),
            config,
            index: Mutex::new(index),
            access_counter: AtomicU64::new(next_seq),
            persist_lock: tokio::sync::Mutex::new(()),
            metrics,
        })
    }

    fn index_key(&self) -> String {
        format!("{}/cache/index", self.config.namespace)
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}/cache/rec/{}", self.config.namespace, key)
    }

    fn next_seq(&self) -> u64 {
        self.access_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of records currently indexed.
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    /// Whether a record exists for the key, expired or not.
    pub fn contains(&self, key: &str) -> bool {
        self.index.lock().contains_key(key)
    }

    /// The current record cap.
    pub fn max_items(&self) -> u32 {
        self.max_items.load(Ordering::Relaxed)
    }

    /// Store a payload under a key with the given retention window.
    pub async fn put(
        &self,
        key: &str,
        payload: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), SyncError> {
        let now_ms = Utc::now().timestamp_millis();
        let record = CacheRecord::new(key, payload, ttl, now_ms);
        let bytes = serde_json::to_vec(&record)?;
        self.storage.set(&self.record_key(key), bytes).await?;

        let evicted = {
            let mut index = self.index.lock();
            index.insert(
                key.to_string(),
                IndexEntry {
                    key: key.to_string(),
                    stored_at_ms: now_ms,
                    ttl_ms: record.ttl_ms,
                    access_seq: self.next_seq(),
                },
            );
            evict_overflow_locked(&mut index, self.max_items() as usize)
        };

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicting records over cap");
            self.metrics.cache_evicted(evicted.len() as u64);
            self.delete_records(&evicted).await;
        }

        self.persist_index().await
    }

    /// Fetch the record for a key, whatever its age.
    ///
    /// Freshness and expiry are the caller's judgment; the store only
    /// updates recency. A record whose payload document is missing or
    /// corrupt is dropped from the index and reported as absent.
    pub async fn get(&self, key: &str) -> Result<Option<CacheRecord>, SyncError> {
        {
            let mut index = self.index.lock();
            match index.get_mut(key) {
                Some(entry) => entry.access_seq = self.next_seq(),
                None => return Ok(None),
            }
        }

        match self.storage.get(&self.record_key(key)).await? {
            Some(bytes) => match serde_json::from_slice::<CacheRecord>(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!(key, error = %e, "corrupt cache record, dropping");
                    self.index.lock().remove(key);
                    let _ = self.storage.delete(&self.record_key(key)).await;
                    self.persist_index().await?;
                    Ok(None)
                }
            },
            None => {
                warn!(key, "cache record missing from storage, dropping index entry");
                self.index.lock().remove(key);
                self.persist_index().await?;
                Ok(None)
            }
        }
    }

    /// Fetch the record only if it is younger than `stale_window`.
    ///
    /// A present-but-stale record reads as `None` here; it stays cached
    /// for offline fallback.
    pub async fn get_fresh(
        &self,
        key: &str,
        stale_window: Duration,
    ) -> Result<Option<CacheRecord>, SyncError> {
        let now_ms = Utc::now().timestamp_millis();
        Ok(self
            .get(key)
            .await?
            .filter(|record| record.is_fresh(stale_window, now_ms)))
    }

    /// Remove one record, reporting whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool, SyncError> {
        let existed = self.index.lock().remove(key).is_some();
        if existed {
            self.storage.delete(&self.record_key(key)).await?;
            self.persist_index().await?;
        }
        Ok(existed)
    }

    /// Remove every record whose key starts with `prefix`.
    ///
    /// This is how mutations invalidate reads: all cached pages and filter
    /// variants of a resource share its key prefix.
    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, SyncError> {
        let removed: Vec<String> = {
            let mut index = self.index.lock();
            let keys: Vec<String> = index
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            for key in &keys {
                index.remove(key);
            }
            keys
        };

        if !removed.is_empty() {
            debug!(prefix, count = removed.len(), "invalidated cached records");
            self.delete_records(&removed).await;
            self.persist_index().await?;
        }
        Ok(removed.len())
    }

    /// Purge expired records.
    pub async fn sweep(&self) -> Result<SweepResult, SyncError> {
        let start = Instant::now();
        let now_ms = Utc::now().timestamp_millis();

        let expired: Vec<String> = {
            let mut index = self.index.lock();
            let keys: Vec<String> = index
                .values()
                .filter(|e| e.is_expired(now_ms))
                .map(|e| e.key.clone())
                .collect();
            for key in &keys {
                index.remove(key);
            }
            keys
        };

        if !expired.is_empty() {
            self.metrics.cache_expired(expired.len() as u64);
            self.delete_records(&expired).await;
            self.persist_index().await?;
        }

        Ok(SweepResult {
            records_removed: expired.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Update the record cap, evicting immediately if it shrank.
    pub async fn set_max_items(&self, max_items: u32) -> Result<(), SyncError> {
        self.max_items.store(max_items, Ordering::Relaxed);

        let evicted = {
            let mut index = self.index.lock();
            evict_overflow_locked(&mut index, max_items as usize)
        };
        if !evicted.is_empty() {
            debug!(
                max_items,
                count = evicted.len(),
                "cap shrank, evicting records"
            );
            self.metrics.cache_evicted(evicted.len() as u64);
            self.delete_records(&evicted).await;
            self.persist_index().await?;
        }
        Ok(())
    }

    /// Run periodic sweeps until cancelled.
    pub async fn run_sweeper(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick would sweep an instant after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("cache sweeper stopping");
                    break;
                }

                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(result) if result.records_removed > 0 => debug!(%result, "cache sweep"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "cache sweep failed"),
                    }
                }
            }
        }
    }

    /// Best-effort deletion of payload documents; the index is the source
    /// of truth, so a failed delete only leaves an orphan behind.
    async fn delete_records(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.storage.delete(&self.record_key(key)).await {
                warn!(key, error = %e, "failed to delete cache record");
            }
        }
    }

    async fn persist_index(&self) -> Result<(), SyncError> {
        let _guard = self.persist_lock.lock().await;
        let entries: Vec<IndexEntry> = self.index.lock().values().cloned().collect();
        let bytes = serde_json::to_vec(&entries)?;
        self.storage.set(&self.index_key(), bytes).await?;
        Ok(())
    }
}
