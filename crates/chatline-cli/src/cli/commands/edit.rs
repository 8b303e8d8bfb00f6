//! Edit command handler.

use std::sync::Arc;

use anyhow::{Context, Result};
use chatline_core::config::Config;
use chatline_core::interrupt::{self, InterruptedError};
use chatline_core::{ChannelAlerts, Session, SessionContext};
use chatline_types::Message;

pub struct EditOptions<'a> {
    pub config: &'a Config,
    pub id: &'a str,
    pub text: &'a str,
    pub machine: bool,
    pub flow_id: &'a str,
    pub session_id: Option<&'a str>,
}

pub async fn run(options: EditOptions<'_>) -> Result<()> {
    let (alerts, mut alert_rx) = ChannelAlerts::channel();
    let collaborators = super::http_collaborators(options.config, Arc::new(alerts))?;
    let context = SessionContext {
        flow_id: options.flow_id.to_string(),
        session_id: options.session_id.map(str::to_string),
        refetch: options.config.edit.refetch,
    };
    let (mut session, _updates) = Session::new(collaborators, context);

    let message = if options.machine {
        Message::machine("")
    } else {
        Message::user("")
    };
    let id = session.push(message.with_id(options.id));

    session.begin_edit(&id).context("begin edit")?;
    session.commit_edit(&id, options.text).context("commit edit")?;

    while session
        .machine(&id)
        .is_some_and(|machine| machine.pending_commit().is_some())
    {
        tokio::select! {
            () = session.step() => {}
            () = interrupt::wait_for_interrupt() => return Err(InterruptedError.into()),
        }
    }

    if let Ok(alert) = alert_rx.try_recv() {
        anyhow::bail!("{}: {}", alert.title, alert.list.join("; "));
    }
    println!("Updated message {id}");
    Ok(())
}
