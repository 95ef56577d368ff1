//! Tideline - adaptive offline-first sync runtime
//!
//! This library keeps client applications useful on links that come and go.
//! It watches connection quality and memory pressure, derives a performance
//! policy from them, and routes every read and write through that policy:
//! reads prefer fresh cache, collapse concurrent duplicates and fall back to
//! stale cache offline; writes queue durably while offline and replay in
//! order when the link returns.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        TidelineRuntime                         │
//! │                                                                │
//! │  platform ──► NetworkMonitor ──┐                               │
//! │  signals  ──► MemoryMonitor ───┼──► PolicyEngine               │
//! │                                │         │ PerformancePolicy   │
//! │                                ▼         ▼                     │
//! │               SyncOrchestrator ◄─────────┘                     │
//! │                 │ fetch: dedup + CacheStore + backend          │
//! │                 │ mutate: backend, or OfflineQueue offline     │
//! │                 │ subscribe: push events through EventThrottle │
//! │                 ▼                                              │
//! │             ResourceClient (your backend adapter)              │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use tideline::netinfo::{ConnectionInfo, SharedMemoryInfo, SharedNetworkInfo};
//! use tideline::storage::FileStorage;
//! use tideline::{FetchRequest, RuntimeConfig, RuntimeDeps, TidelineRuntime};
//!
//! let network_info = SharedNetworkInfo::new(ConnectionInfo::default());
//! let deps = RuntimeDeps {
//!     client: backend_adapter,
//!     push: None,
//!     network_info: Arc::new(network_info.clone()),
//!     memory_info: Arc::new(SharedMemoryInfo::default()),
//!     storage: Arc::new(FileStorage::open("/var/lib/bridge/tideline").await?),
//! };
//! let runtime = TidelineRuntime::start(RuntimeConfig::default(), deps).await?;
//!
//! // Reads honor the live policy: cache first, network when needed.
//! let vessels = runtime.orchestrator().fetch(FetchRequest::new("vessels")).await?;
//!
//! // Platform connectivity callbacks keep the monitor current.
//! network_info.update(|i| i.online = Some(false));
//! runtime.network().notify_change();
//!
//! runtime.shutdown().await;
//! ```

pub mod client;
pub mod dedup;
pub mod error;
pub mod netinfo;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod runtime;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod throttle;

pub use client::{FetchRequest, MutationRequest, PushChannel, PushEvent, ResourceClient};
pub use error::SyncError;
pub use orchestrator::{DataSource, FetchOutcome, MutateOptions, MutateOutcome, SyncOrchestrator};
pub use policy::PerformancePolicy;
pub use runtime::{RuntimeConfig, RuntimeDeps, TidelineRuntime};
