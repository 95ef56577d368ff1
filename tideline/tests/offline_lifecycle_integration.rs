//! Integration tests for the full runtime lifecycle.
//!
//! These tests exercise the complete wiring through the public API:
//! - connectivity loss → cached reads and queued writes → replay on reconnect
//! - policy changes flowing into fetch page sizes and cache budgets
//! - request deduplication across concurrent callers
//! - queue durability across a simulated process restart
//!
//! Run with: `cargo test --test offline_lifecycle_integration`

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::tempdir;

use tideline::client::MutationKind;
use tideline::netinfo::{
    ConnectionInfo, EffectiveType, MemorySample, SharedMemoryInfo, SharedNetworkInfo,
};
use tideline::storage::{BoxFuture, FileStorage, MemoryStorage, Storage};
use tideline::{
    DataSource, FetchRequest, MutateOptions, MutateOutcome, MutationRequest, ResourceClient,
    RuntimeConfig, RuntimeDeps, SyncError, TidelineRuntime,
};

// ============================================================================
// Helper Functions
// ============================================================================

/// A backend that records every call and answers with canned data.
struct RecordingClient {
    fetches: Mutex<Vec<FetchRequest>>,
    mutations: Mutex<Vec<MutationRequest>>,
    /// Simulated network latency for fetches.
    fetch_delay: Duration,
}

impl RecordingClient {
    fn new() -> Arc<Self> {
        Self::with_fetch_delay(Duration::ZERO)
    }

    fn with_fetch_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fetches: Mutex::new(Vec::new()),
            mutations: Mutex::new(Vec::new()),
            fetch_delay: delay,
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetches.lock().len()
    }

    fn fetch_log(&self) -> Vec<FetchRequest> {
        self.fetches.lock().clone()
    }

    fn mutation_log(&self) -> Vec<MutationRequest> {
        self.mutations.lock().clone()
    }
}

impl ResourceClient for RecordingClient {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Vec<Value>, SyncError>> {
        Box::pin(async move {
            tokio::time::sleep(self.fetch_delay).await;
            self.fetches.lock().push(request);
            Ok(vec![json!({"id": 7, "berth": "A4", "status": "moored"})])
        })
    }

    fn mutate(&self, request: MutationRequest) -> BoxFuture<'_, Result<Option<Value>, SyncError>> {
        Box::pin(async move {
            self.mutations.lock().push(request.clone());
            Ok(Some(request.payload))
        })
    }
}

/// Platform signals for a healthy 4G link.
fn fast_link() -> SharedNetworkInfo {
    SharedNetworkInfo::new(ConnectionInfo {
        effective_type: Some(EffectiveType::Cell4g),
        ..Default::default()
    })
}

/// Platform signals for no connectivity at all.
fn dead_link() -> SharedNetworkInfo {
    SharedNetworkInfo::new(ConnectionInfo {
        online: Some(false),
        ..Default::default()
    })
}

fn deps(
    client: Arc<RecordingClient>,
    network_info: &SharedNetworkInfo,
    storage: Arc<dyn Storage>,
) -> RuntimeDeps {
    RuntimeDeps {
        client,
        push: None,
        network_info: Arc::new(network_info.clone()),
        memory_info: Arc::new(SharedMemoryInfo::default()),
        storage,
    }
}

/// Drive the debounced monitor past a connectivity flip.
async fn settle(runtime: &TidelineRuntime) {
    runtime.network().notify_change();
    tokio::time::sleep(Duration::from_millis(500)).await;
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A vessel's full voyage: fetch in port, sail out of coverage, keep reading
/// and writing, and let the runtime reconcile when the link returns.
///
/// 1. Online fetch goes to the network and lands in the cache.
/// 2. Offline, the same read serves the cached record flagged stale.
/// 3. Offline, a write queues durably instead of failing.
/// 4. Back online, the queue replays and invalidates the cached read.
/// 5. The next read goes to the network again.
///
/// Runs on the real clock: the dedup settle window expires on wall time,
/// which a paused tokio clock never advances.
#[tokio::test]
async fn test_voyage_lifecycle_offline_and_back() {
    let network_info = fast_link();
    let client = RecordingClient::new();
    let runtime = TidelineRuntime::start(
        RuntimeConfig::default(),
        deps(Arc::clone(&client), &network_info, Arc::new(MemoryStorage::new())),
    )
    .await
    .expect("runtime should start");

    // An explicit limit keeps one cache key across policy tiers; requests
    // without one are keyed per tier by the filled-in page size.
    let request = FetchRequest::new("moorings").with_limit(20);

    let first = runtime.orchestrator().fetch(request.clone()).await.unwrap();
    assert_eq!(first.source, DataSource::Network);
    assert_eq!(client.fetch_count(), 1);

    // The link drops.
    network_info.update(|i| i.online = Some(false));
    settle(&runtime).await;
    assert!(!runtime.orchestrator().is_online());

    // Reads keep answering from cache, flagged stale.
    let offline_read = runtime.orchestrator().fetch(request.clone()).await.unwrap();
    assert_eq!(offline_read.source, DataSource::StaleCache);
    assert_eq!(offline_read.records, first.records);
    assert_eq!(client.fetch_count(), 1, "no network call while offline");

    // Writes queue instead of failing.
    let departure = MutationRequest::update("moorings", json!({"id": 7, "status": "departed"}));
    let outcome = runtime
        .orchestrator()
        .mutate(departure, MutateOptions::default())
        .await
        .unwrap();
    assert!(matches!(outcome, MutateOutcome::Queued { .. }));
    assert_eq!(runtime.queue().len(), 1);
    assert!(client.mutation_log().is_empty());

    // The link returns: replay drains the queue and drops the cached read.
    network_info.update(|i| {
        i.online = Some(true);
        i.effective_type = Some(EffectiveType::Cell4g);
    });
    settle(&runtime).await;

    let mutations = client.mutation_log();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].payload["status"], "departed");
    assert!(runtime.queue().is_empty());

    let refreshed = runtime.orchestrator().fetch(request).await.unwrap();
    assert_eq!(
        refreshed.source,
        DataSource::Network,
        "replay should invalidate the cached read"
    );
    assert_eq!(client.fetch_count(), 2);

    let snapshot = runtime.metrics().snapshot();
    assert_eq!(snapshot.cache_stale_served, 1);
    assert_eq!(snapshot.mutations_queued, 1);
    assert_eq!(snapshot.replay_succeeded, 1);

    runtime.shutdown().await;
}

/// Degrading the link shrinks the page size applied to limitless fetches.
#[tokio::test(start_paused = true)]
async fn test_degraded_link_shrinks_fetch_pages() {
    let network_info = fast_link();
    let client = RecordingClient::new();
    let runtime = TidelineRuntime::start(
        RuntimeConfig::default(),
        deps(Arc::clone(&client), &network_info, Arc::new(MemoryStorage::new())),
    )
    .await
    .unwrap();

    runtime
        .orchestrator()
        .fetch(FetchRequest::new("vessels"))
        .await
        .unwrap();

    // The link degrades to 2G-class.
    network_info.update(|i| i.effective_type = Some(EffectiveType::Cell2g));
    settle(&runtime).await;

    runtime
        .orchestrator()
        .fetch(FetchRequest::new("berths"))
        .await
        .unwrap();

    let log = client.fetch_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].limit, Some(50), "fast tier page size");
    assert_eq!(log[1].limit, Some(10), "slow tier page size");

    runtime.shutdown().await;
}

/// Writes queued offline replay strictly in the order they were made.
#[tokio::test(start_paused = true)]
async fn test_queue_preserves_creation_order_across_replay() {
    let network_info = dead_link();
    let client = RecordingClient::new();
    let runtime = TidelineRuntime::start(
        RuntimeConfig::default(),
        deps(Arc::clone(&client), &network_info, Arc::new(MemoryStorage::new())),
    )
    .await
    .unwrap();

    let writes = [
        MutationRequest::insert("cargo-manifests", json!({"cargo": "grain", "tons": 1200})),
        MutationRequest::update("cargo-manifests", json!({"id": 1, "status": "loaded"})),
        MutationRequest::delete("cargo-manifests", json!({"id": 2})),
    ];
    for write in writes {
        let outcome = runtime
            .orchestrator()
            .mutate(write, MutateOptions::default())
            .await
            .unwrap();
        assert!(matches!(outcome, MutateOutcome::Queued { .. }));
    }
    assert_eq!(runtime.queue().len(), 3);

    network_info.update(|i| {
        i.online = Some(true);
        i.effective_type = Some(EffectiveType::Cell4g);
    });
    settle(&runtime).await;

    let replayed = client.mutation_log();
    assert_eq!(replayed.len(), 3);
    assert_eq!(
        replayed.iter().map(|m| m.kind).collect::<Vec<_>>(),
        vec![MutationKind::Insert, MutationKind::Update, MutationKind::Delete]
    );
    assert_eq!(replayed[0].payload["cargo"], "grain");
    assert!(runtime.queue().is_empty());

    runtime.shutdown().await;
}

/// Concurrent identical reads collapse onto a single network call.
#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_reads_share_one_network_call() {
    let network_info = fast_link();
    let client = RecordingClient::with_fetch_delay(Duration::from_millis(25));
    let runtime = TidelineRuntime::start(
        RuntimeConfig::default(),
        deps(Arc::clone(&client), &network_info, Arc::new(MemoryStorage::new())),
    )
    .await
    .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let orchestrator = runtime.orchestrator().clone();
        handles.push(tokio::spawn(async move {
            orchestrator.fetch(FetchRequest::new("vessels")).await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.source, DataSource::Network);
    }

    assert_eq!(client.fetch_count(), 1, "callers should share one request");
    assert_eq!(runtime.metrics().snapshot().dedup_collapsed, 3);

    runtime.shutdown().await;
}

/// A queued backlog written by one process drains when the next one starts
/// online, using the file backend both would use in production.
#[tokio::test(start_paused = true)]
async fn test_backlog_survives_process_restart() {
    let dir = tempdir().unwrap();

    // First run: offline, two writes queue, then the process stops.
    let offline_info = dead_link();
    let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
    let first = TidelineRuntime::start(
        RuntimeConfig::default(),
        deps(RecordingClient::new(), &offline_info, storage),
    )
    .await
    .unwrap();
    for payload in [json!({"berth": "A4"}), json!({"berth": "B1"})] {
        first
            .orchestrator()
            .mutate(
                MutationRequest::insert("moorings", payload),
                MutateOptions::default(),
            )
            .await
            .unwrap();
    }
    assert_eq!(first.queue().len(), 2);
    first.shutdown().await;

    // Second run: online from the start, backlog drains during startup.
    let client = RecordingClient::new();
    let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
    let second = TidelineRuntime::start(
        RuntimeConfig::default(),
        deps(Arc::clone(&client), &fast_link(), storage),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let replayed = client.mutation_log();
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].payload["berth"], "A4");
    assert_eq!(replayed[1].payload["berth"], "B1");
    assert!(second.queue().is_empty());

    second.shutdown().await;
}

/// High memory pressure halves the cache budget and disables prefetch even
/// on a fast link.
#[tokio::test(start_paused = true)]
async fn test_memory_pressure_halves_cache_budget() {
    let network_info = fast_link();
    let memory_info = SharedMemoryInfo::default();
    let runtime = TidelineRuntime::start(
        RuntimeConfig::default(),
        RuntimeDeps {
            client: RecordingClient::new(),
            push: None,
            network_info: Arc::new(network_info.clone()),
            memory_info: Arc::new(memory_info.clone()),
            storage: Arc::new(MemoryStorage::new()),
        },
    )
    .await
    .unwrap();
    assert!(runtime.policy().borrow().prefetch_enabled);
    assert_eq!(runtime.store().max_items(), 200);

    memory_info.set(MemorySample {
        used_fraction: Some(0.95),
        ..Default::default()
    });
    // The memory monitor polls; wait out one interval.
    tokio::time::sleep(Duration::from_secs(11)).await;

    let policy = runtime.policy().borrow().clone();
    assert!(!policy.prefetch_enabled);
    assert_eq!(policy.max_cache_items, 100);
    assert_eq!(runtime.store().max_items(), 100);

    runtime.shutdown().await;
}
