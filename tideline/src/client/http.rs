//! REST binding for [`ResourceClient`].
//!
//! [`HttpApiClient`] maps the abstract fetch/mutate operations onto a
//! conventional JSON-over-HTTP backend:
//!
//! - fetch: `GET {base}/{resource}?field=value&order=name.asc&limit=50`
//! - insert: `POST {base}/{resource}` with the payload as JSON body
//! - update: `PATCH {base}/{resource}` with the payload as JSON body
//! - delete: `DELETE {base}/{resource}` with the payload as JSON body
//!
//! Fetch responses must be JSON arrays; mutation responses may be empty,
//! `null`, or a single echoed record.
//!
//! The wire layer sits behind the [`HttpTransport`] trait so tests can run
//! against a canned transport; [`ReqwestTransport`] is the production
//! implementation.

use std::time::Duration;

use serde_json::Value;

use crate::client::{FetchRequest, MutationKind, MutationRequest, ResourceClient};
use crate::error::SyncError;
use crate::storage::BoxFuture;

/// Request timeout applied by [`ReqwestTransport::new`] callers that have
/// no better number.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP verbs the REST binding emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// One wire request: verb, absolute URL, optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
}

/// Trait for HTTP execution, allowing mock implementations in tests.
pub trait HttpTransport: Send + Sync {
    /// Execute a request and return the raw response body.
    ///
    /// Implementations must map non-success statuses to
    /// [`SyncError::Transport`].
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<Vec<u8>, SyncError>>;
}

/// Production HTTP transport using reqwest.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, Result<Vec<u8>, SyncError>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
                HttpMethod::Patch => self.client.patch(&request.url),
                HttpMethod::Delete => self.client.delete(&request.url),
            };
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| SyncError::Transport(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SyncError::Transport(format!(
                    "HTTP {} from {}",
                    status, request.url
                )));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| SyncError::Transport(format!("failed to read response: {e}")))?;
            Ok(bytes.to_vec())
        })
    }
}

/// [`ResourceClient`] speaking JSON REST over an [`HttpTransport`].
pub struct HttpApiClient<C: HttpTransport> {
    transport: C,
    base_url: String,
}

impl<C: HttpTransport> HttpApiClient<C> {
    /// Creates a client rooted at `base_url`.
    ///
    /// A trailing slash on the base URL is tolerated.
    pub fn new(transport: C, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
        }
    }

    /// Builds the collection URL for a fetch, query string included.
    fn fetch_url(&self, request: &FetchRequest) -> String {
        let mut url = format!("{}/{}", self.base_url, request.resource);

        let mut params: Vec<String> = request
            .filters
            .iter()
            .map(|(field, value)| format!("{field}={}", super::scalar_text(value)))
            .collect();
        if let Some(order) = &request.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(format!("order={}.{direction}", order.field));
        }
        if let Some(limit) = request.limit {
            params.push(format!("limit={limit}"));
        }

        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }
}

impl<C: HttpTransport> ResourceClient for HttpApiClient<C> {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<Vec<Value>, SyncError>> {
        Box::pin(async move {
            let url = self.fetch_url(&request);
            let bytes = self
                .transport
                .execute(HttpRequest {
                    method: HttpMethod::Get,
                    url,
                    body: None,
                })
                .await?;

            let value: Value = serde_json::from_slice(&bytes)?;
            match value {
                Value::Array(records) => Ok(records),
                other => Err(SyncError::Serialization(format!(
                    "expected a JSON array of records for '{}', got {}",
                    request.resource,
                    json_type_name(&other)
                ))),
            }
        })
    }

    fn mutate(
        &self,
        request: MutationRequest,
    ) -> BoxFuture<'_, Result<Option<Value>, SyncError>> {
        Box::pin(async move {
            let method = match request.kind {
                MutationKind::Insert => HttpMethod::Post,
                MutationKind::Update => HttpMethod::Patch,
                MutationKind::Delete => HttpMethod::Delete,
            };
            let bytes = self
                .transport
                .execute(HttpRequest {
                    method,
                    url: self.resource_url(&request.resource),
                    body: Some(request.payload),
                })
                .await?;

            if bytes.is_empty() {
                return Ok(None);
            }
            let value: Value = serde_json::from_slice(&bytes)?;
            match value {
                Value::Null => Ok(None),
                other => Ok(Some(other)),
            }
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
