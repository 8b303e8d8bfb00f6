//! CLI command handlers.

pub mod config;
pub mod edit;
pub mod render;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use chatline_core::config::Config;
use chatline_core::{
    AlertSink, Collaborators, Connector, HttpConnector, HttpMessageStore, MessageStore,
};

/// HTTP-backed collaborators built from the effective config.
pub fn http_collaborators(config: &Config, alerts: Arc<dyn AlertSink>) -> Result<Collaborators> {
    let base_url = config.effective_base_url()?;
    let api_key = config.effective_api_key();

    let connector = HttpConnector::new(base_url.clone(), api_key.clone(), config.connect_timeout())
        .context("build stream connector")?;
    let store = HttpMessageStore::new(base_url, api_key, config.request_timeout())
        .context("build message store")?;

    Ok(Collaborators {
        connector: Arc::new(connector) as Arc<dyn Connector>,
        store: Arc::new(store) as Arc<dyn MessageStore>,
        alerts,
    })
}
