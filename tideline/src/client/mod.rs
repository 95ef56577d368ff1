//! Backend interfaces.
//!
//! The runtime never speaks to a backend directly; embedders hand it a
//! [`ResourceClient`] for request/response traffic and optionally a
//! [`PushChannel`] for server-initiated events. Both are dyn-compatible
//! traits so tests and exotic transports can swap in freely; a REST binding
//! over HTTP ships in [`HttpApiClient`].
//!
//! This module also owns the cache key format. A fetch request maps to a
//! deterministic key of the form `resource::canonical-query`, which gives
//! the invalidation side a simple contract: everything cached for a
//! resource shares the `resource::` prefix.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::storage::BoxFuture;

mod http;

pub use http::{
    HttpApiClient, HttpMethod, HttpRequest, HttpTransport, ReqwestTransport, DEFAULT_HTTP_TIMEOUT,
};

/// The storage key prefix shared by every cached read of a resource.
pub fn resource_cache_prefix(resource: &str) -> String {
    format!("{resource}::")
}

/// Sort order for a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    /// Field to order by.
    pub field: String,
    /// Ascending when true, descending otherwise.
    pub ascending: bool,
}

/// A declarative read: resource, equality filters, optional order and limit.
///
/// Filters are kept in a sorted map so that logically identical requests
/// produce byte-identical cache keys regardless of construction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Logical collection name, e.g. `vessels`.
    pub resource: String,
    /// Equality filters applied server-side.
    pub filters: BTreeMap<String, Value>,
    /// Optional sort order.
    pub order: Option<SortOrder>,
    /// Page size; filled from the live policy when absent.
    pub limit: Option<u32>,
}

impl FetchRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            filters: BTreeMap::new(),
            order: None,
            limit: None,
        }
    }

    /// Add an equality filter.
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Sort by a field.
    pub fn with_order(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(SortOrder {
            field: field.into(),
            ascending,
        });
        self
    }

    /// Cap the number of records returned.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The deterministic cache key for this request.
    ///
    /// Two requests compare equal exactly when their keys do. The key is
    /// human-readable on purpose; it shows up in logs and storage tooling.
    pub fn cache_key(&self) -> String {
        let mut key = resource_cache_prefix(&self.resource);

        let mut first = true;
        for (field, value) in &self.filters {
            if !first {
                key.push('&');
            }
            first = false;
            key.push_str(field);
            key.push('=');
            key.push_str(&scalar_text(value));
        }

        if let Some(order) = &self.order {
            key.push_str("|order=");
            key.push_str(&order.field);
            key.push_str(if order.ascending { ".asc" } else { ".desc" });
        }
        if let Some(limit) = self.limit {
            key.push_str(&format!("|limit={limit}"));
        }
        key
    }
}

/// Render a filter value without JSON string quoting.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The three mutation operations the runtime knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Insert => "insert",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write against a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Target collection.
    pub resource: String,
    /// Operation to perform.
    pub kind: MutationKind,
    /// Operation payload; for updates and deletes it carries the record
    /// identity in whatever shape the backend expects.
    pub payload: Value,
}

impl MutationRequest {
    pub fn new(resource: impl Into<String>, kind: MutationKind, payload: Value) -> Self {
        Self {
            resource: resource.into(),
            kind,
            payload,
        }
    }

    pub fn insert(resource: impl Into<String>, payload: Value) -> Self {
        Self::new(resource, MutationKind::Insert, payload)
    }

    pub fn update(resource: impl Into<String>, payload: Value) -> Self {
        Self::new(resource, MutationKind::Update, payload)
    }

    pub fn delete(resource: impl Into<String>, payload: Value) -> Self {
        Self::new(resource, MutationKind::Delete, payload)
    }
}

/// Request/response access to the backing data service.
///
/// Implementations must be cheap to call concurrently; the runtime
/// deduplicates reads above this trait, not inside it.
pub trait ResourceClient: Send + Sync {
    /// Fetch records matching a request.
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Vec<Value>, SyncError>>;

    /// Apply a mutation, returning the affected record if the backend
    /// echoes one.
    fn mutate(&self, request: MutationRequest)
        -> BoxFuture<'_, Result<Option<Value>, SyncError>>;
}

/// A server-initiated event for one resource.
#[derive(Debug, Clone)]
pub struct PushEvent {
    /// Resource the event concerns.
    pub resource: String,
    /// Opaque event payload.
    pub payload: Bytes,
}

/// Callback invoked for each raw push event.
pub type PushHandler = Arc<dyn Fn(PushEvent) + Send + Sync>;

/// Live event delivery from the backend (websocket, SSE, MQTT, anything).
///
/// Handlers receive raw events; throttling and realtime gating happen in
/// the runtime on top of this trait.
pub trait PushChannel: Send + Sync {
    /// Register a handler for one resource's events.
    fn subscribe(&self, resource: &str, handler: PushHandler)
        -> Result<PushSubscription, SyncError>;
}

/// Handle keeping one push registration alive.
///
/// Dropping the handle unsubscribes.
pub struct PushSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl PushSubscription {
    /// Wrap the transport's unsubscribe action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to clean up.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribe explicitly.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
