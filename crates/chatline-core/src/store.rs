//! Persistence collaborator.

use std::fmt;
use std::time::Duration;

use chatline_types::{UpdateMessagePayload, UpdateOptions};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Connection failure or timeout.
    Connect,
    /// Non-2xx response.
    HttpStatus,
    /// Could not build the request.
    Request,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::Connect => write!(f, "connect"),
            StoreErrorKind::HttpStatus => write!(f, "http_status"),
            StoreErrorKind::Request => write!(f, "request"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Uses the server's `detail` field when the body carries one.
    pub fn http_status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| json.get("detail").and_then(|d| d.as_str()).map(str::to_string));
        let message = match detail {
            Some(detail) => format!("HTTP {status}: {detail}"),
            None => format!("HTTP {status}"),
        };
        Self::new(StoreErrorKind::HttpStatus, message)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StoreError {}

/// Persists message updates. No retries are attempted here.
pub trait MessageStore: Send + Sync {
    fn update_message(
        &self,
        payload: UpdateMessagePayload,
        options: UpdateOptions,
    ) -> BoxFuture<'static, Result<(), StoreError>>;
}

/// `PUT {base}/api/v1/monitor/messages/{id}`.
#[derive(Debug, Clone)]
pub struct HttpMessageStore {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpMessageStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| StoreError::new(StoreErrorKind::Request, e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// # Errors
    /// Returns an error if the id cannot form a valid URL.
    pub fn message_url(&self, id: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::new(StoreErrorKind::Request, "base URL cannot have a path")
            })?
            .pop_if_empty()
            .extend(["api", "v1", "monitor", "messages", id]);
        Ok(url)
    }

    async fn put(&self, payload: UpdateMessagePayload) -> Result<(), StoreError> {
        let url = self.message_url(&payload.id)?;
        let mut request = self.http.put(url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            let kind = if e.is_builder() {
                StoreErrorKind::Request
            } else {
                StoreErrorKind::Connect
            };
            StoreError::new(kind, format!("update request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::http_status(status.as_u16(), &body));
        }
        Ok(())
    }
}

impl MessageStore for HttpMessageStore {
    fn update_message(
        &self,
        payload: UpdateMessagePayload,
        options: UpdateOptions,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let store = self.clone();
        tracing::debug!(id = %payload.id, refetch = options.refetch, "updating message");
        async move { store.put(payload).await }.boxed()
    }
}
