//! Durable offline action queue.
//!
//! Mutations issued while disconnected are captured here instead of being
//! dropped, then replayed in submission order once connectivity returns.
//! Actions live in an in-memory FIFO mirrored into a single storage
//! document, so the queue survives process restarts.
//!
//! # Architecture
//!
//! ```text
//!  mutate (offline) ──► OfflineQueue ──► Storage (one queue document)
//!                          │  ▲
//!               replay on  │  │ retry_failed / discard_failed
//!               reconnect  ▼  │
//!                      ResourceClient ──► backend
//!                          │
//!                          └──► QueueEvent broadcast (enqueued, replayed,
//!                               failed, discarded)
//! ```
//!
//! Replay walks the front of the queue strictly in order across all
//! mutation kinds, one action at a time, retrying each with exponential
//! backoff; an action that spends all its attempts parks on a failed list
//! and the queue moves on, so a single bad action never wedges the rest.
//! Failed actions stay inspectable until retried or discarded.
//!
//! # Example
//!
//! ```ignore
//! let queue = OfflineQueue::open(storage, "tideline", ReplayConfig::default(), metrics).await?;
//! queue.enqueue(MutationRequest::insert("vessels", payload)).await?;
//! // later, once back online:
//! let summary = queue.replay(client.as_ref(), &store).await?;
//! info!(%summary, "offline actions replayed");
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::client::{resource_cache_prefix, MutationRequest, ResourceClient};
use crate::error::SyncError;
use crate::storage::Storage;
use crate::store::CacheStore;
use crate::telemetry::RuntimeMetrics;

mod action;

pub use action::{ActionStatus, QueuedAction};

/// Default delivery attempts per action.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Default growth factor between consecutive backoff delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default upper bound on any single backoff delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Retry schedule for replaying queued actions.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Attempts allowed per action before it parks as failed.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub backoff_base: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay.
    pub backoff_cap: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl ReplayConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap;
        self
    }

    /// Delay before the given 1-based attempt.
    ///
    /// The first attempt runs immediately; the second waits `backoff_base`;
    /// each further attempt multiplies the previous delay, capped at
    /// `backoff_cap`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let millis = self.backoff_base.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32 - 2);
        let capped = millis.min(self.backoff_cap.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Queue lifecycle notifications.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// An action was accepted into the queue.
    Enqueued { action: QueuedAction },
    /// An action was applied on the backend during replay.
    Replayed { action: QueuedAction },
    /// An action spent all its attempts and parked as failed.
    ActionFailed { action: QueuedAction, message: String },
    /// A failed action was dropped without being applied.
    Discarded { id: String },
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Actions applied on the backend.
    pub replayed: usize,
    /// Actions that exhausted their attempts.
    pub failed: usize,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "replayed {} actions ({} failed)",
            self.replayed, self.failed
        )
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<QueuedAction>,
    failed: Vec<QueuedAction>,
}

/// Durable FIFO of offline mutations.
pub struct OfflineQueue {
    storage: Arc<dyn Storage>,
    namespace: String,
    config: ReplayConfig,
    inner: Mutex<QueueInner>,
    /// Serializes queue document writes so an older snapshot can never
    /// overwrite a newer one.
    persist_lock: tokio::sync::Mutex<()>,
    /// At most one replay pass runs at a time.
    replay_lock: tokio::sync::Mutex<()>,
    events_tx: broadcast::Sender<QueueEvent>,
    metrics: Arc<RuntimeMetrics>,
}

impl OfflineQueue {
    /// Open the queue, loading any persisted actions.
    ///
    /// Actions left `in_flight` by a crash mid-attempt are recovered as
    /// pending; a corrupt queue document is logged and discarded.
    pub async fn open(
        storage: Arc<dyn Storage>,
        namespace: impl Into<String>,
        config: ReplayConfig,
        metrics: Arc<RuntimeMetrics>,
    ) -> Result<Self, SyncError> {
        let namespace = namespace.into();
        let actions: Vec<QueuedAction> = match storage.get(&queue_key(&namespace)).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(actions) => actions,
                Err(e) => {
                    warn!(error = %e, "corrupt queue document, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut inner = QueueInner::default();
        for mut action in actions {
            match action.status {
                ActionStatus::Pending => inner.pending.push_back(action),
                ActionStatus::InFlight => {
                    warn!(id = %action.id, "recovering interrupted action as pending");
                    action.status = ActionStatus::Pending;
                    inner.pending.push_back(action);
                }
                ActionStatus::Failed => inner.failed.push(action),
                ActionStatus::Done => {}
            }
        }
        info!(
            pending = inner.pending.len(),
            failed = inner.failed.len(),
            namespace = %namespace,
            "offline queue opened"
        );

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            storage,
            namespace,
            config,
            inner: Mutex::new(inner),
            persist_lock: tokio::sync::Mutex::new(()),
            replay_lock: tokio::sync::Mutex::new(()),
            events_tx,
            metrics,
        })
    }

    /// Accept a mutation for later delivery.
    ///
    /// The action is durable once this returns; the returned copy is the
    /// optimistic value callers can show immediately.
    pub async fn enqueue(&self, request: MutationRequest) -> Result<QueuedAction, SyncError> {
        let action = QueuedAction::new(
            request,
            self.config.max_attempts,
            Utc::now().timestamp_millis(),
        );
        self.inner.lock().pending.push_back(action.clone());
        self.persist().await?;

        info!(
            id = %action.id,
            resource = %action.resource,
            kind = %action.kind,
            "queued offline mutation"
        );
        self.metrics.mutation_queued();
        let _ = self.events_tx.send(QueueEvent::Enqueued {
            action: action.clone(),
        });
        Ok(action)
    }

    /// Actions waiting for replay, front first.
    pub fn pending(&self) -> Vec<QueuedAction> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    /// Actions that exhausted their attempts.
    pub fn failed(&self) -> Vec<QueuedAction> {
        self.inner.lock().failed.clone()
    }

    /// Number of actions waiting for replay.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Lifecycle state of one action, wherever it currently sits.
    pub fn status(&self, id: &str) -> Option<ActionStatus> {
        let inner = self.inner.lock();
        inner
            .pending
            .iter()
            .chain(inner.failed.iter())
            .find(|a| a.id == id)
            .map(|a| a.status)
    }

    /// Subscribe to queue lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events_tx.subscribe()
    }

    /// Replay pending actions strictly front to back.
    ///
    /// Each action is attempted with exponential backoff between its own
    /// retries. Exhaustion parks the action as failed and replay continues
    /// with the next one. Successful actions invalidate cached reads of
    /// the same resource.
    pub async fn replay(
        &self,
        client: &dyn ResourceClient,
        store: &CacheStore,
    ) -> Result<ReplaySummary, SyncError> {
        let _guard = self.replay_lock.lock().await;
        let mut summary = ReplaySummary::default();

        loop {
            let attempt = {
                let mut inner = self.inner.lock();
                match inner.pending.front_mut() {
                    Some(action) => {
                        action.begin_attempt();
                        action.clone()
                    }
                    None => break,
                }
            };
            self.persist().await?;

            let delay = self.config.backoff_delay(attempt.attempt_count);
            if !delay.is_zero() {
                debug!(
                    id = %attempt.id,
                    attempt = attempt.attempt_count,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match client.mutate(attempt.to_request()).await {
                Ok(_) => {
                    // Locate by id: retry_failed may have inserted an older
                    // action ahead of the one in flight.
                    let done = {
                        let mut inner = self.inner.lock();
                        let mut done = inner
                            .pending
                            .iter()
                            .position(|a| a.id == attempt.id)
                            .and_then(|pos| inner.pending.remove(pos));
                        if let Some(action) = done.as_mut() {
                            action.complete();
                        }
                        done
                    };
                    self.persist().await?;

                    if let Some(action) = done {
                        info!(
                            id = %action.id,
                            resource = %action.resource,
                            attempts = action.attempt_count,
                            "replayed offline action"
                        );
                        self.metrics.replay_succeeded();
                        summary.replayed += 1;
                        store
                            .invalidate_prefix(&resource_cache_prefix(&action.resource))
                            .await?;
                        let _ = self.events_tx.send(QueueEvent::Replayed { action });
                    }
                }
                Err(e) => {
                    let parked = {
                        let mut inner = self.inner.lock();
                        let pos = inner.pending.iter().position(|a| a.id == attempt.id);
                        let retry = match pos.and_then(|p| inner.pending.get_mut(p)) {
                            Some(action) => action.fail_attempt(),
                            None => true,
                        };
                        if retry {
                            None
                        } else {
                            let action = pos.and_then(|p| inner.pending.remove(p));
                            if let Some(action) = &action {
                                inner.failed.push(action.clone());
                            }
                            action
                        }
                    };
                    self.persist().await?;

                    match parked {
                        Some(action) => {
                            warn!(
                                id = %action.id,
                                resource = %action.resource,
                                attempts = action.attempt_count,
                                error = %e,
                                "offline action exhausted its attempts"
                            );
                            self.metrics.replay_failed();
                            summary.failed += 1;
                            let _ = self.events_tx.send(QueueEvent::ActionFailed {
                                action,
                                message: e.to_string(),
                            });
                        }
                        None => {
                            debug!(id = %attempt.id, error = %e, "replay attempt failed, retrying")
                        }
                    }
                }
            }
        }

        if summary.replayed > 0 || summary.failed > 0 {
            info!(%summary, "replay pass finished");
        }
        Ok(summary)
    }

    /// Re-arm one failed action for a fresh round of attempts.
    ///
    /// The action rejoins the pending queue at its original position per
    /// creation order, so a later replay still applies writes in the order
    /// they were issued. Returns the re-armed action, or `None` for an
    /// unknown id.
    pub async fn retry_failed(&self, id: &str) -> Result<Option<QueuedAction>, SyncError> {
        let rearmed = {
            let mut inner = self.inner.lock();
            match inner.failed.iter().position(|a| a.id == id) {
                Some(pos) => {
                    let mut action = inner.failed.remove(pos);
                    action.reset_for_retry();
                    let at = inner
                        .pending
                        .iter()
                        .position(|a| a.created_at_ms > action.created_at_ms)
                        .unwrap_or(inner.pending.len());
                    inner.pending.insert(at, action.clone());
                    Some(action)
                }
                None => None,
            }
        };

        if let Some(action) = &rearmed {
            self.persist().await?;
            info!(id = %action.id, resource = %action.resource, "failed action re-armed");
        }
        Ok(rearmed)
    }

    /// Drop one failed action without applying it.
    pub async fn discard_failed(&self, id: &str) -> Result<bool, SyncError> {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.failed.iter().position(|a| a.id == id) {
                Some(pos) => {
                    inner.failed.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.persist().await?;
            info!(id, "failed action discarded");
            let _ = self.events_tx.send(QueueEvent::Discarded { id: id.to_string() });
        }
        Ok(removed)
    }

    async fn persist(&self) -> Result<(), SyncError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot: Vec<QueuedAction> = {
            let inner = self.inner.lock();
            inner
                .pending
                .iter()
                .chain(inner.failed.iter())
                .cloned()
                .collect()
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        self.storage.set(&queue_key(&self.namespace), bytes).await?;
        Ok(())
    }
}

fn queue_key(namespace: &str) -> String {
    format!("{namespace}/queue/actions")
}
