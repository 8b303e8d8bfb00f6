//! Alerting collaborator.

use tokio::sync::mpsc;

pub const STREAM_ERROR_TITLE: &str = "Error on Streaming";
pub const UPDATE_ERROR_TITLE: &str = "Error updating messages.";

/// A dismissible error notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub list: Vec<String>,
}

impl Alert {
    pub fn new(title: impl Into<String>, list: Vec<String>) -> Self {
        Self {
            title: title.into(),
            list,
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn alert(&self, alert: Alert) {
        tracing::warn!(title = %alert.title, details = ?alert.list, "alert");
    }
}

/// Forwards alerts to a channel.
#[derive(Debug, Clone)]
pub struct ChannelAlerts {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlerts {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlerts {
    fn alert(&self, alert: Alert) {
        if self.tx.send(alert).is_err() {
            tracing::debug!("alert receiver dropped");
        }
    }
}
