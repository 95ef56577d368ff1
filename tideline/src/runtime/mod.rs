//! Runtime lifecycle: owns every component and background task.
//!
//! [`TidelineRuntime`] is the single ownership point for the monitors, the
//! policy engine, the cache store, the offline queue and the orchestrator.
//! Embedders construct it once with their platform adapters, hand the
//! [`SyncOrchestrator`] to consumers, and shut it down explicitly; nothing
//! in the crate touches ambient global state.
//!
//! # Architecture
//!
//! ```text
//! NetworkMonitor ──watch──► PolicyEngine ──watch──► policy fanout
//! MemoryMonitor ──watch──►      │                   ├─ realtime gate
//!       │                       │                   └─ store sizing
//!       │                       ▼
//!       └──watch──────────► SyncOrchestrator ◄── CacheStore + sweeper
//!                               ▲                 OfflineQueue
//!              reconnect ───────┘
//!              replay trigger
//! ```
//!
//! # Startup Sequence
//!
//! 1. Connection monitor, with an immediate first sample.
//! 2. Memory pressure poller.
//! 3. Policy engine deriving from both monitors.
//! 4. Cache store, sized by the initial policy, plus its expiry sweeper.
//! 5. Offline queue, reloading any persisted backlog.
//! 6. Policy fanout keeping the realtime gate and store cap current.
//! 7. Replay trigger watching for offline to online transitions.
//! 8. The orchestrator facade over all of it.
//!
//! # Example
//!
//! ```ignore
//! use tideline::runtime::{RuntimeConfig, RuntimeDeps, TidelineRuntime};
//!
//! let deps = RuntimeDeps {
//!     client: Arc::new(HttpApiClient::new(transport, "https://api.example.com")),
//!     push: None,
//!     network_info: Arc::new(platform_info.clone()),
//!     memory_info: Arc::new(SharedMemoryInfo::default()),
//!     storage: Arc::new(FileStorage::open("/var/lib/bridge/cache").await?),
//! };
//! let runtime = TidelineRuntime::start(RuntimeConfig::default(), deps).await?;
//!
//! let vessels = runtime.orchestrator().fetch(FetchRequest::new("vessels")).await?;
//!
//! // Platform connectivity callbacks feed the monitor.
//! runtime.network().notify_change();
//!
//! runtime.shutdown().await;
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{PushChannel, ResourceClient};
use crate::dedup::RequestDedup;
use crate::error::SyncError;
use crate::netinfo::{MemoryInfoProvider, MemoryMonitor, NetworkInfoProvider, NetworkMonitor};
use crate::orchestrator::{OrchestratorSignals, SyncOrchestrator};
use crate::policy::{PerformancePolicy, PolicyEngine};
use crate::queue::{OfflineQueue, QueueEvent};
use crate::storage::Storage;
use crate::store::CacheStore;
use crate::telemetry::RuntimeMetrics;

mod config;

pub use config::RuntimeConfig;

/// The injected collaborators the runtime is built around.
pub struct RuntimeDeps {
    /// Backend client for reads, writes and replay.
    pub client: Arc<dyn ResourceClient>,
    /// Optional live push transport.
    pub push: Option<Arc<dyn PushChannel>>,
    /// Platform connection signals.
    pub network_info: Arc<dyn NetworkInfoProvider>,
    /// Platform memory signals.
    pub memory_info: Arc<dyn MemoryInfoProvider>,
    /// Persistence backend shared by the store and the queue.
    pub storage: Arc<dyn Storage>,
}

/// Owns the runtime's components and background tasks.
pub struct TidelineRuntime {
    /// Connection monitor; platform callbacks feed its `notify_change`.
    network: Arc<NetworkMonitor>,
    /// Memory pressure poller.
    memory: Arc<MemoryMonitor>,
    /// Persisted read cache.
    store: Arc<CacheStore>,
    /// Durable mutation queue.
    queue: Arc<OfflineQueue>,
    /// Consumer-facing facade.
    orchestrator: SyncOrchestrator,
    /// Live policy feed.
    policy_rx: watch::Receiver<PerformancePolicy>,
    /// Master cancellation token for every background task.
    cancel: CancellationToken,
    /// Background task handles, awaited on shutdown.
    tasks: Vec<JoinHandle<()>>,
    metrics: Arc<RuntimeMetrics>,
    /// Configuration retained for accessors.
    config: RuntimeConfig,
}

impl TidelineRuntime {
    /// Wire up every component and start the background tasks.
    pub async fn start(config: RuntimeConfig, deps: RuntimeDeps) -> Result<Self, SyncError> {
        info!(namespace = %config.namespace, "starting tideline runtime");

        let metrics = Arc::new(RuntimeMetrics::new());
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        // 1. Connection monitor with an immediate first sample.
        let network = Arc::new(NetworkMonitor::new(
            deps.network_info,
            config.monitor.clone(),
            Arc::clone(&metrics),
        ));
        let network_rx = network.subscribe();
        tasks.push(tokio::spawn(Arc::clone(&network).run(cancel.clone())));

        // 2. Memory pressure poller.
        let memory = Arc::new(MemoryMonitor::new(
            deps.memory_info,
            config.memory_poll_interval,
        ));
        let pressure_rx = memory.subscribe();
        tasks.push(tokio::spawn(Arc::clone(&memory).run(cancel.clone())));

        // 3. Policy engine deriving from both monitors.
        let engine = PolicyEngine::new(network_rx.clone(), pressure_rx, Arc::clone(&metrics));
        let policy_rx = engine.subscribe();
        tasks.push(tokio::spawn(engine.run(cancel.clone())));

        // 4. Cache store sized by the initial policy, plus its sweeper.
        let store_config = config
            .store
            .clone()
            .with_namespace(config.namespace.clone())
            .with_max_items(policy_rx.borrow().max_cache_items);
        let store = Arc::new(
            CacheStore::open(Arc::clone(&deps.storage), store_config, Arc::clone(&metrics))
                .await?,
        );
        tasks.push(tokio::spawn(Arc::clone(&store).run_sweeper(cancel.clone())));

        // 5. Offline queue, reloading any persisted backlog.
        let queue = Arc::new(
            OfflineQueue::open(
                Arc::clone(&deps.storage),
                config.namespace.clone(),
                config.replay.clone(),
                Arc::clone(&metrics),
            )
            .await?,
        );
        info!(pending = queue.len(), failed = queue.failed().len(), "offline queue opened");

        // 6. Policy fanout: the realtime gate and the store cap follow the
        //    live policy.
        let (realtime_tx, realtime_rx) = watch::channel(policy_rx.borrow().realtime_enabled);
        {
            let mut policy_rx = policy_rx.clone();
            let store = Arc::clone(&store);
            let fanout_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;

                        _ = fanout_cancel.cancelled() => break,

                        changed = policy_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let (realtime, max_items) = {
                                let policy = policy_rx.borrow_and_update();
                                (policy.realtime_enabled, policy.max_cache_items)
                            };
                            realtime_tx.send_if_modified(|current| {
                                if *current == realtime {
                                    return false;
                                }
                                *current = realtime;
                                true
                            });
                            if max_items != store.max_items() {
                                if let Err(error) = store.set_max_items(max_items).await {
                                    warn!(%error, "failed to apply cache cap from policy");
                                }
                            }
                        }
                    }
                }
            }));
        }

        // 7. Replay the queue when connectivity returns, and once at startup
        //    if a backlog survived the last run.
        {
            let mut network_rx = network_rx.clone();
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            let client = Arc::clone(&deps.client);
            let replay_cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let mut was_online = network_rx.borrow().is_online();
                if was_online && !queue.is_empty() {
                    info!(pending = queue.len(), "replaying backlog from previous run");
                    replay_queue(&queue, client.as_ref(), &store).await;
                }
                loop {
                    tokio::select! {
                        biased;

                        _ = replay_cancel.cancelled() => break,

                        changed = network_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let online = network_rx.borrow_and_update().is_online();
                            if online && !was_online && !queue.is_empty() {
                                info!(pending = queue.len(), "reconnected, replaying offline queue");
                                replay_queue(&queue, client.as_ref(), &store).await;
                            }
                            was_online = online;
                        }
                    }
                }
            }));
        }

        // 8. The orchestrator facade over all of it.
        let dedup = RequestDedup::new(config.dedup.clone(), Arc::clone(&metrics));
        let orchestrator = SyncOrchestrator::new(
            deps.client,
            deps.push,
            Arc::clone(&store),
            Arc::clone(&queue),
            dedup,
            OrchestratorSignals {
                policy: policy_rx.clone(),
                network: network_rx,
                realtime: realtime_rx,
                cancel: cancel.clone(),
            },
            Arc::clone(&metrics),
        );

        info!(
            quality = %network.quality(),
            page_size = policy_rx.borrow().page_size,
            "tideline runtime started"
        );

        Ok(Self {
            network,
            memory,
            store,
            queue,
            orchestrator,
            policy_rx,
            cancel,
            tasks,
            metrics,
            config,
        })
    }

    // ────────────────────────────────────────────────────────────────────
    // Accessors
    // ────────────────────────────────────────────────────────────────────

    /// The read/write facade consumers talk to.
    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Watch channel carrying the live policy.
    pub fn policy(&self) -> watch::Receiver<PerformancePolicy> {
        self.policy_rx.clone()
    }

    /// Connection monitor; wire platform callbacks to its `notify_change`.
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Memory pressure poller.
    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    /// The persisted read cache.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// The offline queue, for inspection and manual retry.
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Subscribe to queue lifecycle events.
    pub fn queue_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> Arc<RuntimeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The configuration the runtime was started with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A token cancelled at shutdown, for embedder tasks to tie into.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Stop every background task and wait for them to finish.
    ///
    /// The store and queue persist synchronously with their mutations, so
    /// there is nothing to flush here.
    pub async fn shutdown(self) {
        info!("shutting down tideline runtime");
        self.cancel.cancel();
        futures::future::join_all(self.tasks).await;
        info!("tideline runtime shutdown complete");
    }
}

/// One replay pass with outcome logging; failures never propagate.
async fn replay_queue(queue: &OfflineQueue, client: &dyn ResourceClient, store: &CacheStore) {
    match queue.replay(client, store).await {
        Ok(summary) => {
            if summary.replayed > 0 || summary.failed > 0 {
                info!(%summary, "offline queue replay finished");
            }
        }
        Err(error) => warn!(%error, "offline queue replay aborted"),
    }
}
