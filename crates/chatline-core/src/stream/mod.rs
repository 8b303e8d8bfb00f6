//! Stream source: one server-sent event connection per streaming message.

mod sse;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

pub use sse::{HttpConnector, event_stream, parse_frame};

/// Event delivered by a stream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One text fragment.
    Chunk(String),
    /// Graceful end of stream.
    Closed,
    /// The stream failed; `message` is the server's error text, if any.
    Failed { message: Option<String> },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk(_))
    }
}

/// Opens event streams. The HTTP implementation is [`HttpConnector`].
///
/// The returned stream must end after its first terminal event.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str) -> BoxStream<'static, StreamEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Could not reach the server (connect failure or timeout).
    Connect,
    /// Non-2xx response.
    HttpStatus,
    /// The body failed mid-stream.
    Body,
    /// The body ended without a close event.
    UnexpectedEof,
    /// The stream URL could not be resolved.
    InvalidUrl,
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamErrorKind::Connect => write!(f, "connect"),
            StreamErrorKind::HttpStatus => write!(f, "http_status"),
            StreamErrorKind::Body => write!(f, "body"),
            StreamErrorKind::UnexpectedEof => write!(f, "unexpected_eof"),
            StreamErrorKind::InvalidUrl => write!(f, "invalid_url"),
        }
    }
}

/// Transport failure. Logged, then surfaced as [`StreamEvent::Failed`].
#[derive(Debug, Clone)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn http_status(status: u16) -> Self {
        Self::new(StreamErrorKind::HttpStatus, format!("HTTP {status}"))
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for StreamError {}

/// An open stream. Closing is idempotent; dropping the handle closes it.
pub struct StreamHandle {
    url: String,
    events: BoxStream<'static, StreamEvent>,
    token: CancellationToken,
    closed: AtomicBool,
}

impl StreamHandle {
    pub fn open(connector: &dyn Connector, url: &str) -> Self {
        tracing::debug!(url, "opening event stream");
        Self {
            url: url.to_string(),
            events: connector.connect(url),
            token: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Token that cancels this stream from elsewhere (teardown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Closes the stream. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        tracing::debug!(url = %self.url, "event stream closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.token.is_cancelled()
    }

    /// Next event, or `None` once closed or cancelled.
    ///
    /// A terminal event closes the handle before it is returned.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.is_closed() {
            return None;
        }
        let event = tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            event = self.events.next() => event,
        };
        match event {
            Some(event) => {
                if event.is_terminal() {
                    self.close();
                }
                Some(event)
            }
            None => {
                self.close();
                None
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
