//! Watch command handler.

use std::sync::Arc;

use anyhow::{Context, Result};
use chatline_core::config::Config;
use chatline_core::interrupt::{self, InterruptedError};
use chatline_core::{LogAlerts, MessagePhase, Session, SessionContext, SessionUpdate};
use chatline_types::Message;

/// Follows one stream to completion and prints what it produced.
///
/// Stream errors are logged as alerts; the partial text is still printed
/// before the command fails.
pub async fn run(config: &Config, url: &str, segments: bool) -> Result<()> {
    let collaborators = super::http_collaborators(config, Arc::new(LogAlerts))?;
    let context = SessionContext {
        refetch: config.edit.refetch,
        ..SessionContext::default()
    };
    let (mut session, mut updates) = Session::new(collaborators, context);
    let id = session.push(Message::machine_streaming(url));

    while session.has_active_streams() {
        tokio::select! {
            () = session.step() => {}
            () = interrupt::wait_for_interrupt() => {
                session.remove(&id);
                return Err(InterruptedError.into());
            }
        }
        while let Ok(update) = updates.try_recv() {
            if let SessionUpdate::LockChanged(locked) = update {
                tracing::debug!(locked, "streaming lock changed");
            }
        }
    }

    let machine = session.machine(&id).context("message missing after stream")?;
    if segments {
        let rendered = session.present(&id).unwrap_or_default();
        println!(
            "{}",
            serde_json::to_string_pretty(&rendered).context("serialize segments")?
        );
    } else {
        println!("{}", machine.display_text());
    }

    if machine.phase() == MessagePhase::Errored {
        anyhow::bail!("Stream ended with an error");
    }
    Ok(())
}
