//! Runtime telemetry for observability and diagnostics.
//!
//! This module provides metrics collection for the adaptive runtime. It uses
//! lock-free atomic counters so instrumentation can be sprinkled through hot
//! paths (cache reads, dedup lookups, throttle offers) with minimal overhead.
//!
//! # Architecture
//!
//! ```text
//! Runtime components ─────► RuntimeMetrics ─────► TelemetrySnapshot ─────► Views
//!                           (atomic counters)     (point-in-time copy)     (logs, UI)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tideline::telemetry::RuntimeMetrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(RuntimeMetrics::new());
//!
//! // Record events from runtime components
//! metrics.cache_hit();
//! metrics.dedup_collapsed();
//!
//! // Take snapshot for display
//! let snapshot = metrics.snapshot();
//! println!("cache hit rate: {:.1}%", snapshot.cache_hit_rate() * 100.0);
//! ```

mod metrics;
mod snapshot;

pub use metrics::RuntimeMetrics;
pub use snapshot::TelemetrySnapshot;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading `RUST_LOG`.
///
/// Intended for binaries and examples embedding the runtime; libraries and
/// tests should leave subscriber installation to the host application.
/// Calling it twice is harmless, the second call is ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
