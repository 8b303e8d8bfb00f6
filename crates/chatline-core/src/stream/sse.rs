use std::time::Duration;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use url::Url;

use super::{Connector, StreamError, StreamErrorKind, StreamEvent};

#[derive(Deserialize)]
struct ChunkFrame {
    chunk: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorFrame {
    error: Option<serde_json::Value>,
}

/// Maps one SSE frame to a stream event. `None` means the frame is dropped.
pub fn parse_frame(event_type: &str, data: &str) -> Option<StreamEvent> {
    match event_type {
        "close" => Some(StreamEvent::Closed),
        "error" => {
            let message = match serde_json::from_str::<ErrorFrame>(data) {
                Ok(frame) => frame.error.and_then(|error| match error {
                    serde_json::Value::String(text) => Some(text),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                }),
                Err(err) => {
                    tracing::debug!("error frame is not JSON: {err}");
                    None
                }
            };
            Some(StreamEvent::Failed { message })
        }
        "" | "message" => match serde_json::from_str::<ChunkFrame>(data) {
            Ok(ChunkFrame {
                chunk: Some(serde_json::Value::String(chunk)),
            }) if !chunk.is_empty() => Some(StreamEvent::Chunk(chunk)),
            Ok(_) => {
                tracing::trace!("dropping frame without chunk text");
                None
            }
            Err(err) => {
                tracing::trace!("dropping malformed frame: {err}");
                None
            }
        },
        other => {
            tracing::trace!(event = other, "ignoring unknown event");
            None
        }
    }
}

/// Turns an SSE byte stream into stream events.
///
/// The result ends after the first terminal event. A body error or EOF
/// without a close frame yields `Failed { message: None }`.
pub fn event_stream<S, E>(body: S) -> BoxStream<'static, StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let frames = body.eventsource().boxed();
    stream::unfold(Some(frames), |state| async move {
        let mut frames = state?;
        loop {
            match frames.next().await {
                Some(Ok(frame)) => match parse_frame(&frame.event, &frame.data) {
                    Some(event) if event.is_terminal() => return Some((event, None)),
                    Some(event) => return Some((event, Some(frames))),
                    None => {}
                },
                Some(Err(err)) => {
                    let err = StreamError::new(StreamErrorKind::Body, err.to_string());
                    tracing::warn!("event stream failed: {err}");
                    return Some((StreamEvent::Failed { message: None }, None));
                }
                None => {
                    let err = StreamError::new(
                        StreamErrorKind::UnexpectedEof,
                        "stream ended without a close event",
                    );
                    tracing::warn!("{err}");
                    return Some((StreamEvent::Failed { message: None }, None));
                }
            }
        }
    })
    .boxed()
}

/// Connects to server-sent event streams over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpConnector {
    /// Builds a connector; relative stream URLs are joined onto `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, StreamError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| StreamError::new(StreamErrorKind::Connect, e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Resolves a possibly relative stream URL.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be parsed or joined.
    pub fn resolve(&self, url: &str) -> Result<Url, StreamError> {
        self.base_url.join(url).map_err(|e| {
            StreamError::new(
                StreamErrorKind::InvalidUrl,
                format!("invalid stream url {url}: {e}"),
            )
        })
    }

    async fn open(&self, url: &str) -> Result<BoxStream<'static, StreamEvent>, StreamError> {
        let url = self.resolve(url)?;
        let mut request = self
            .http
            .get(url)
            .header("accept", "text/event-stream")
            .header("cache-control", "no-cache");
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::http_status(status.as_u16()));
        }

        Ok(event_stream(response.bytes_stream()))
    }
}

impl Connector for HttpConnector {
    fn connect(&self, url: &str) -> BoxStream<'static, StreamEvent> {
        let connector = self.clone();
        let url = url.to_string();
        stream::once(async move {
            match connector.open(&url).await {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(url = %url, "failed to open event stream: {err}");
                    stream::iter([StreamEvent::Failed { message: None }]).boxed()
                }
            }
        })
        .flatten()
        .boxed()
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> StreamError {
    if e.is_timeout() {
        StreamError::new(StreamErrorKind::Connect, format!("Request timed out: {e}"))
    } else if e.is_connect() {
        StreamError::new(StreamErrorKind::Connect, format!("Connection failed: {e}"))
    } else {
        StreamError::new(StreamErrorKind::Body, format!("Network error: {e}"))
    }
}
