//! The read/write front door of the runtime.
//!
//! [`SyncOrchestrator`] composes the cache store, request dedup, offline
//! queue and live policy/connectivity feeds into four consumer-facing
//! operations: [`fetch`](SyncOrchestrator::fetch),
//! [`mutate`](SyncOrchestrator::mutate),
//! [`subscribe`](SyncOrchestrator::subscribe) and
//! [`prefetch`](SyncOrchestrator::prefetch). Every call reads the policy
//! and connectivity watch channels at entry, so behavior always follows the
//! latest derived state.
//!
//! # Architecture
//!
//! ```text
//! fetch ──► fill limit from policy
//!             │
//!             ├─ offline ──► any cached record ──► StaleCache
//!             │                   none ──► NetworkUnavailable
//!             │
//!             ├─ fresh cached record ──► Cache
//!             │
//!             └─ dedup ──► network (retries) ──► store.put ──► Network
//!
//! mutate ──► offline ──► queue.enqueue ──► Queued (optimistic)
//!             │
//!             └─ online ──► client.mutate ──► invalidate resource ──► Applied
//!                               │ failed, offline-capable
//!                               └──► queue.enqueue ──► Queued
//! ```
//!
//! Push events flow through one [`EventThrottle`] per subscription, whose
//! interval tracks the live policy and whose gate is the runtime's realtime
//! flag.
//!
//! # Example
//!
//! ```ignore
//! let request = FetchRequest::new("vessels").with_filter("status", "active");
//! let outcome = orchestrator.fetch(request).await?;
//! if outcome.is_stale() {
//!     banner.show_offline_data_notice();
//! }
//! render(outcome.records);
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{
    resource_cache_prefix, FetchRequest, MutationRequest, PushChannel, PushEvent,
    PushSubscription, ResourceClient,
};
use crate::dedup::RequestDedup;
use crate::error::SyncError;
use crate::netinfo::ConnectionSnapshot;
use crate::policy::PerformancePolicy;
use crate::queue::{OfflineQueue, QueuedAction};
use crate::store::CacheStore;
use crate::telemetry::RuntimeMetrics;
use crate::throttle::EventThrottle;

/// Where the records of a [`FetchOutcome`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Fetched from the backend during this call.
    Network,
    /// Served from a cache record still inside the policy's stale window.
    Cache,
    /// Served from a cache record of unknown freshness because the client
    /// is offline.
    StaleCache,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Network => "network",
            DataSource::Cache => "cache",
            DataSource::StaleCache => "stale-cache",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed read with its provenance.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The records, newest known state for the request.
    pub records: Vec<Value>,
    /// Where the records came from.
    pub source: DataSource,
}

impl FetchOutcome {
    /// Whether the records could not be revalidated against the backend.
    pub fn is_stale(&self) -> bool {
        self.source == DataSource::StaleCache
    }
}

/// How a mutation was resolved.
#[derive(Debug, Clone)]
pub enum MutateOutcome {
    /// Applied directly against the backend.
    Applied {
        /// The backend's echo of the record, when it returns one.
        record: Option<Value>,
    },
    /// Accepted into the offline queue for later replay.
    ///
    /// The action carries the submitted payload as the optimistic local
    /// value: accepted, not yet confirmed.
    Queued { action: QueuedAction },
}

/// Per-call mutation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutateOptions {
    /// Whether the mutation may be queued instead of applied directly.
    ///
    /// Queueing happens while offline, and as a fallback when a direct
    /// attempt fails in flight. With this off the mutation either applies
    /// now or surfaces its error.
    pub offline_capable: bool,
}

impl Default for MutateOptions {
    fn default() -> Self {
        Self {
            offline_capable: true,
        }
    }
}

impl MutateOptions {
    /// Require the mutation to apply against the backend now or fail.
    pub fn direct() -> Self {
        Self {
            offline_capable: false,
        }
    }
}

/// The live feeds and lifecycle token the orchestrator operates under.
pub struct OrchestratorSignals {
    /// Current performance policy.
    pub policy: watch::Receiver<PerformancePolicy>,
    /// Current connection snapshot.
    pub network: watch::Receiver<ConnectionSnapshot>,
    /// Gate for push subscription delivery.
    pub realtime: watch::Receiver<bool>,
    /// Parent token for subscription background tasks.
    pub cancel: CancellationToken,
}

/// Answers reads and writes while honoring the current policy.
///
/// Cloning is cheap and shares every underlying component; speculative
/// operations clone the orchestrator into their spawned task.
#[derive(Clone)]
pub struct SyncOrchestrator {
    /// Backend the orchestrator reads from and writes to.
    client: Arc<dyn ResourceClient>,
    /// Live event transport; [`subscribe`](Self::subscribe) fails without one.
    push: Option<Arc<dyn PushChannel>>,
    /// Persisted read cache.
    store: Arc<CacheStore>,
    /// Durable mutation queue.
    queue: Arc<OfflineQueue>,
    /// Collapses concurrent identical reads.
    dedup: RequestDedup<Vec<Value>>,
    policy_rx: watch::Receiver<PerformancePolicy>,
    network_rx: watch::Receiver<ConnectionSnapshot>,
    realtime_rx: watch::Receiver<bool>,
    /// Parent token for subscription tasks.
    cancel: CancellationToken,
    metrics: Arc<RuntimeMetrics>,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<dyn ResourceClient>,
        push: Option<Arc<dyn PushChannel>>,
        store: Arc<CacheStore>,
        queue: Arc<OfflineQueue>,
        dedup: RequestDedup<Vec<Value>>,
        signals: OrchestratorSignals,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        Self {
            client,
            push,
            store,
            queue,
            dedup,
            policy_rx: signals.policy,
            network_rx: signals.network,
            realtime_rx: signals.realtime,
            cancel: signals.cancel,
            metrics,
        }
    }

    /// The policy currently in force.
    pub fn policy(&self) -> PerformancePolicy {
        self.policy_rx.borrow().clone()
    }

    /// Whether the last connection snapshot showed any connectivity.
    pub fn is_online(&self) -> bool {
        self.network_rx.borrow().is_online()
    }

    /// Resolve a read.
    ///
    /// Precedence: offline serves whatever cache record exists, however
    /// old, flagged [`DataSource::StaleCache`]; online serves a record
    /// still inside the policy's stale window without touching the
    /// network; otherwise the backend is fetched (concurrent identical
    /// calls collapse onto one request) and the result cached for the
    /// policy's cache window.
    ///
    /// A request without an explicit limit gets the policy's page size, so
    /// the same logical request keys differently under different tiers.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, SyncError> {
        let policy = self.policy();
        let request = match request.limit {
            Some(_) => request,
            None => request.with_limit(policy.page_size),
        };
        let key = request.cache_key();

        if !self.is_online() {
            return match self.store.get(&key).await? {
                Some(record) => {
                    self.metrics.cache_stale_served();
                    debug!(key, "offline, serving cached record as stale");
                    Ok(FetchOutcome {
                        records: into_records(record.payload),
                        source: DataSource::StaleCache,
                    })
                }
                None => Err(SyncError::NetworkUnavailable { key }),
            };
        }

        if let Some(record) = self.store.get_fresh(&key, policy.stale_window).await? {
            self.metrics.cache_hit();
            debug!(key, "serving fresh cache record");
            return Ok(FetchOutcome {
                records: into_records(record.payload),
                source: DataSource::Cache,
            });
        }

        self.metrics.cache_miss();
        let records = self.fetch_through_network(&key, request, &policy).await?;
        Ok(FetchOutcome {
            records,
            source: DataSource::Network,
        })
    }

    /// Fetch from the backend, collapsed per key, retried per policy, and
    /// cached on success.
    async fn fetch_through_network(
        &self,
        key: &str,
        request: FetchRequest,
        policy: &PerformancePolicy,
    ) -> Result<Vec<Value>, SyncError> {
        let client = Arc::clone(&self.client);
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let retry_count = policy.retry_count;
        let retry_delay = policy.retry_delay;
        let cache_window = policy.cache_window;
        let cache_key = key.to_string();

        self.dedup
            .dedupe(key, move || async move {
                let mut attempt = 0u32;
                let mut delay = retry_delay;
                let records = loop {
                    match client.fetch(request.clone()).await {
                        Ok(records) => break records,
                        Err(error) if attempt < retry_count => {
                            attempt += 1;
                            metrics.fetch_retried();
                            debug!(
                                resource = %request.resource,
                                attempt,
                                %error,
                                "fetch failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            delay *= 2;
                        }
                        Err(error) => return Err(error),
                    }
                };
                store
                    .put(&cache_key, Value::Array(records.clone()), cache_window)
                    .await?;
                Ok(records)
            })
            .await
    }

    /// Resolve a write.
    ///
    /// Online, the mutation is applied directly and cached reads of the
    /// resource are invalidated. Offline, or when a direct attempt fails
    /// and the call is offline-capable, the mutation is accepted into the
    /// queue and returned as [`MutateOutcome::Queued`] with the submitted
    /// payload as its optimistic value. Retry pacing for queued actions
    /// belongs to the queue's replay, not to this call.
    pub async fn mutate(
        &self,
        request: MutationRequest,
        options: MutateOptions,
    ) -> Result<MutateOutcome, SyncError> {
        if !self.is_online() {
            if !options.offline_capable {
                return Err(SyncError::MutationFailed {
                    resource: request.resource,
                    operation: request.kind.to_string(),
                    attempts: 0,
                    message: "offline and the mutation did not opt into queueing".to_string(),
                });
            }
            info!(
                resource = %request.resource,
                kind = %request.kind,
                "offline, mutation queued for replay"
            );
            let action = self.queue.enqueue(request).await?;
            return Ok(MutateOutcome::Queued { action });
        }

        match self.client.mutate(request.clone()).await {
            Ok(record) => {
                self.store
                    .invalidate_prefix(&resource_cache_prefix(&request.resource))
                    .await?;
                self.metrics.mutation_applied();
                info!(resource = %request.resource, kind = %request.kind, "mutation applied");
                Ok(MutateOutcome::Applied { record })
            }
            Err(error) if options.offline_capable => {
                warn!(
                    resource = %request.resource,
                    kind = %request.kind,
                    %error,
                    "direct mutation failed, queueing for replay"
                );
                let action = self.queue.enqueue(request).await?;
                Ok(MutateOutcome::Queued { action })
            }
            Err(error) => Err(error),
        }
    }

    /// Open a throttled push subscription for a resource.
    ///
    /// Raw events are offered to a per-subscription [`EventThrottle`] whose
    /// interval follows the live policy and whose delivery gate is the
    /// runtime's realtime flag. Dropping the returned handle (or calling
    /// [`ResourceSubscription::unsubscribe`]) detaches the transport and
    /// cancels the deferred-flush machinery.
    pub fn subscribe(
        &self,
        resource: &str,
        handler: impl Fn(PushEvent) + Send + Sync + 'static,
    ) -> Result<ResourceSubscription, SyncError> {
        let push = self
            .push
            .as_ref()
            .ok_or_else(|| SyncError::Transport("no push channel configured".to_string()))?;

        let throttle = EventThrottle::new(
            self.policy_rx.borrow().throttle_interval,
            self.realtime_rx.clone(),
            Arc::clone(&self.metrics),
            handler,
        );

        let cancel = self.cancel.child_token();
        let flusher = tokio::spawn(throttle.clone().run(cancel.clone()));

        // Keep the throttle interval tracking the live policy.
        let mut policy_rx = self.policy_rx.clone();
        let tuned = throttle.clone();
        let tuner_cancel = cancel.clone();
        let tuner = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = tuner_cancel.cancelled() => break,

                    changed = policy_rx.changed() => match changed {
                        Ok(()) => {
                            let interval = policy_rx.borrow_and_update().throttle_interval;
                            tuned.set_interval(interval);
                        }
                        Err(_) => break,
                    },
                }
            }
        });

        let offer = throttle.clone();
        let transport = push.subscribe(
            resource,
            Arc::new(move |event: PushEvent| offer.offer(event)),
        )?;

        info!(resource, "push subscription opened");
        Ok(ResourceSubscription {
            resource: resource.to_string(),
            transport: Some(transport),
            cancel,
            tasks: vec![flusher, tuner],
        })
    }

    /// Speculatively warm the cache for a request.
    ///
    /// Gated on the policy's prefetch flag and on being online; otherwise a
    /// no-op. The fetch runs in a detached task with no cancellation token
    /// and is simply abandoned on failure, so callers never wait on it.
    pub fn prefetch(&self, request: FetchRequest) {
        if !self.policy_rx.borrow().prefetch_enabled {
            debug!(resource = %request.resource, "prefetch disabled by policy");
            return;
        }
        if !self.is_online() {
            debug!(resource = %request.resource, "prefetch skipped while offline");
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            let resource = request.resource.clone();
            if let Err(error) = this.fetch(request).await {
                debug!(%resource, %error, "prefetch abandoned");
            }
        });
    }
}

/// Normalize a stored payload back into a record list.
fn into_records(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(records) => records,
        other => vec![other],
    }
}

/// Handle for an open push subscription.
///
/// Dropping it detaches the transport subscription and cancels the
/// throttle's background tasks; a pending, never-delivered value is dropped
/// with them.
pub struct ResourceSubscription {
    resource: String,
    transport: Option<PushSubscription>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ResourceSubscription {
    /// Detach and wait for the background tasks to wind down.
    pub async fn unsubscribe(mut self) {
        self.detach();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    fn detach(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.unsubscribe();
            debug!(resource = %self.resource, "push subscription closed");
        }
        self.cancel.cancel();
    }
}

impl Drop for ResourceSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}
