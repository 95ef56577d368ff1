//! Request deduplication.
//!
//! Dashboards love firing the same read three times at once: a route change,
//! a visibility refresh and a poll tick all want `vessels?status=active`
//! within the same frame. [`RequestDedup`] collapses concurrent identical
//! reads onto one network call and hands every caller a clone of the same
//! settlement.
//!
//! # Architecture
//!
//! ```text
//! dedupe(key) ──► settled window? ──► yes ──► return cached settlement
//!                      │ no
//!                      ▼
//!                 in-flight map ──► hit ──► subscribe to broadcast, await
//!                      │ miss
//!                      ▼
//!                 insert entry, spawn factory
//!                      │
//!                 settle: remove entry ──► fill window ──► broadcast
//! ```
//!
//! The entry leaves the in-flight map *before* subscribers are resolved: a
//! caller arriving at the instant of settlement never joins a completed
//! flight, it either hits the settle window or launches fresh. The settle
//! window keeps the settlement around briefly so bursts that slightly
//! outlive the call (render effects firing one after another) still
//! collapse.
//!
//! The launched call runs in its own task. A caller that gives up waiting
//! abandons its subscription only; the underlying call proceeds and settles
//! for everyone else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::SyncError;
use crate::telemetry::RuntimeMetrics;

/// Default settle window: how long a settlement keeps absorbing duplicates.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(200);

/// Upper bound on retained settlements; far above any realistic burst.
const SETTLED_CAPACITY: u64 = 1_024;

/// Tuning knobs for [`RequestDedup`].
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// How long settlements linger after the call completes. Zero disables
    /// the window entirely.
    pub settle_window: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            settle_window: DEFAULT_SETTLE_WINDOW,
        }
    }
}

impl DedupConfig {
    /// Override the settle window.
    pub fn with_settle_window(mut self, settle_window: Duration) -> Self {
        self.settle_window = settle_window;
        self
    }
}

type Settlement<T> = Result<T, SyncError>;

struct InFlight<T> {
    tx: broadcast::Sender<Settlement<T>>,
    subscribers: usize,
}

struct DedupInner<T> {
    inflight: Mutex<HashMap<String, InFlight<T>>>,
    settled: moka::sync::Cache<String, Settlement<T>>,
    settle_window: Duration,
    metrics: Arc<RuntimeMetrics>,
}

impl<T> DedupInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Resolve a completed call: drop the in-flight entry first, then fill
    /// the settle window, then wake subscribers.
    fn settle(&self, key: &str, result: Settlement<T>) {
        let entry = self.inflight.lock().remove(key);

        if !self.settle_window.is_zero() {
            self.settled.insert(key.to_string(), result.clone());
        }

        if let Some(entry) = entry {
            debug!(
                key,
                subscribers = entry.subscribers,
                ok = result.is_ok(),
                "request settled"
            );
            let _ = entry.tx.send(result);
        }
    }
}

/// Collapses concurrent identical async calls onto a single execution.
///
/// Cloning is cheap and shares the underlying maps; the runtime keeps one
/// instance per result type.
pub struct RequestDedup<T> {
    inner: Arc<DedupInner<T>>,
}

impl<T> Clone for RequestDedup<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> RequestDedup<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: DedupConfig, metrics: Arc<RuntimeMetrics>) -> Self {
        let settled = moka::sync::Cache::builder()
            .max_capacity(SETTLED_CAPACITY)
            .time_to_live(config.settle_window.max(Duration::from_millis(1)))
            .build();
        Self {
            inner: Arc::new(DedupInner {
                inflight: Mutex::new(HashMap::new()),
                settled,
                settle_window: config.settle_window,
                metrics,
            }),
        }
    }

    /// Run `factory` for this key unless an identical call is in flight or
    /// just settled, in which case its settlement is shared instead.
    ///
    /// The factory future is spawned onto the runtime, so it must be
    /// `'static`; it keeps running even if every waiting caller is dropped.
    pub async fn dedupe<F, Fut>(&self, key: &str, factory: F) -> Settlement<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Settlement<T>> + Send + 'static,
    {
        if !self.inner.settle_window.is_zero() {
            if let Some(result) = self.inner.settled.get(key) {
                self.inner.metrics.dedup_collapsed();
                debug!(key, "served from settle window");
                return result;
            }
        }

        let mut rx = {
            let mut inflight = self.inner.inflight.lock();
            if let Some(entry) = inflight.get_mut(key) {
                entry.subscribers += 1;
                self.inner.metrics.dedup_collapsed();
                debug!(key, subscribers = entry.subscribers, "collapsed onto in-flight request");
                entry.tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                inflight.insert(
                    key.to_string(),
                    InFlight {
                        tx,
                        subscribers: 1,
                    },
                );
                drop(inflight);

                self.inner.metrics.dedup_launched();
                debug!(key, "launching request");

                let inner = Arc::clone(&self.inner);
                let task_key = key.to_string();
                let fut = factory();
                tokio::spawn(async move {
                    let result = AssertUnwindSafe(fut)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(SyncError::Transport("request task panicked".to_string()))
                        });
                    inner.settle(&task_key, result);
                });

                rx
            }
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(SyncError::ShuttingDown),
        }
    }

    /// Number of distinct calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.lock().len()
    }

    /// Number of callers waiting on the given key, if it is in flight.
    pub fn subscribers(&self, key: &str) -> Option<usize> {
        self.inner.inflight.lock().get(key).map(|e| e.subscribers)
    }

    /// Drop all in-flight entries and retained settlements.
    ///
    /// Waiting callers resolve with [`SyncError::ShuttingDown`]. Spawned
    /// factory futures keep running but their settlements go nowhere.
    pub fn clear(&self) {
        self.inner.inflight.lock().clear();
        self.inner.settled.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn dedup(settle_window: Duration) -> RequestDedup<String> {
        RequestDedup::new(
            DedupConfig::default().with_settle_window(settle_window),
            Arc::new(RuntimeMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_concurrent_calls_collapse_to_one_execution() {
        let dedup = dedup(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut futures = Vec::new();
        for _ in 0..5 {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            futures.push(async move {
                dedup
                    .dedupe("vessels::all", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok("payload".to_string())
                    })
                    .await
            });
        }

        let results = futures::future::join_all(futures).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), "payload");
        }
        let snapshot = dedup.inner.metrics.snapshot();
        assert_eq!(snapshot.dedup_launched, 1);
        assert_eq!(snapshot.dedup_collapsed, 4);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let dedup = dedup(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        let a = {
            let calls = Arc::clone(&calls);
            dedup.dedupe("a", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("a".to_string())
            })
        };
        let b = {
            let calls = Arc::clone(&calls);
            dedup.dedupe("b", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("b".to_string())
            })
        };

        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_settle_window_absorbs_trailing_duplicates() {
        let dedup = dedup(Duration::from_millis(500));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let calls = Arc::clone(&calls);
            dedup
                .dedupe("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("v".to_string())
                })
                .await
        };
        assert_eq!(first.unwrap(), "v");
        assert_eq!(dedup.in_flight(), 0);

        // Arrives just after settlement: served from the window.
        let second = {
            let calls = Arc::clone(&calls);
            dedup
                .dedupe("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("fresh".to_string())
                })
                .await
        };
        assert_eq!(second.unwrap(), "v");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_settle_window_expires() {
        let dedup = dedup(Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in ["v", "fresh"] {
            let calls = Arc::clone(&calls);
            let result = dedup
                .dedupe("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(expected.to_string())
                })
                .await;
            assert_eq!(result.unwrap(), expected);
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_shared_settlements() {
        let dedup = dedup(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut futures = Vec::new();
        for _ in 0..3 {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            futures.push(async move {
                dedup
                    .dedupe("k", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err::<String, _>(SyncError::Transport("503".to_string()))
                    })
                    .await
            });
        }

        let results = futures::future::join_all(futures).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                SyncError::Transport("503".to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_entry_removed_at_settlement() {
        let dedup = dedup(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            dedup
                .dedupe("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("v".to_string())
                })
                .await
                .unwrap();
            assert_eq!(dedup.in_flight(), 0);
        }

        // With no settle window each sequential call launches fresh.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_subscriber_count_observable() {
        let dedup = dedup(Duration::ZERO);
        let gate = Arc::new(Notify::new());

        let first = {
            let dedup = dedup.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                dedup
                    .dedupe("k", move || async move {
                        gate.notified().await;
                        Ok("v".to_string())
                    })
                    .await
            })
        };
        // Let the first caller register.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dedup.subscribers("k"), Some(1));

        let second = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .dedupe("k", move || async move { Ok("other".to_string()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dedup.subscribers("k"), Some(2));

        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), "v");
        assert_eq!(second.await.unwrap().unwrap(), "v");
        assert_eq!(dedup.subscribers("k"), None);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_flight() {
        let dedup = dedup(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = {
            let dedup = dedup.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                dedup
                    .dedupe("k", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("v".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let survivor = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .dedupe("k", move || async move { Ok("other".to_string()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();

        // The in-flight call still settles for the surviving subscriber.
        assert_eq!(survivor.await.unwrap().unwrap(), "v");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_clear_resolves_waiters_with_shutdown() {
        let dedup = dedup(Duration::ZERO);
        let gate = Arc::new(Notify::new());

        let waiter = {
            let dedup = dedup.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                dedup
                    .dedupe("k", move || async move {
                        gate.notified().await;
                        Ok("v".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        dedup.clear();

        assert_eq!(waiter.await.unwrap().unwrap_err(), SyncError::ShuttingDown);
    }
}
