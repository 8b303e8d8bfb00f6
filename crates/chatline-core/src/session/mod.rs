//! Session runtime.
//!
//! A session owns the conversation log and executes the effects returned by
//! each message's state machine. Stream and persistence tasks only send
//! events onto the session queue; all mutation happens in
//! [`Session::handle_event`], one event at a time.

use std::sync::Arc;

use chatline_render::Segment;
use chatline_types::{Message, MessageId, UpdateMessagePayload, UpdateOptions};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::alert::AlertSink;
use crate::edit::EditError;
use crate::lock::LockGate;
use crate::machine::{Effect, MachineEvent, MessageMachine, MessagePhase};
use crate::store::{MessageStore, StoreError};
use crate::stream::{Connector, StreamEvent, StreamHandle};
use crate::view::{ViewState, present};

/// External collaborators of a session.
#[derive(Clone)]
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub store: Arc<dyn MessageStore>,
    pub alerts: Arc<dyn AlertSink>,
}

/// Identifiers sent with every persisted edit.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub flow_id: String,
    /// Used when a message carries no session id of its own.
    pub session_id: Option<String>,
    /// Ask observers to reload after a successful edit.
    pub refetch: bool,
}

/// Internal queue events.
///
/// `generation` identifies the entry that spawned the task; events whose
/// entry was removed or replaced since are dropped.
#[derive(Debug)]
pub enum SessionEvent {
    Stream {
        id: MessageId,
        generation: u64,
        event: StreamEvent,
    },
    /// The stream task ended without a terminal event (cancelled).
    StreamEnded { id: MessageId, generation: u64 },
    EditPersisted {
        id: MessageId,
        generation: u64,
        text: String,
    },
    EditFailed {
        id: MessageId,
        generation: u64,
        error: StoreError,
    },
}

impl SessionEvent {
    fn target(&self) -> (&MessageId, u64) {
        match self {
            SessionEvent::Stream { id, generation, .. }
            | SessionEvent::StreamEnded { id, generation }
            | SessionEvent::EditPersisted { id, generation, .. }
            | SessionEvent::EditFailed { id, generation, .. } => (id, *generation),
        }
    }
}

/// Notifications for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The message's content or phase changed.
    Changed(MessageId),
    /// A stream settled (normally or not) with this text.
    FinalText { id: MessageId, text: String },
    /// An edit was persisted and applied.
    Edited(MessageId),
    LockChanged(bool),
    /// The conversation should be reloaded from the server.
    RefetchRequested,
}

struct Entry {
    machine: MessageMachine,
    view: ViewState,
    stream: Option<CancellationToken>,
    /// Unique per pushed entry, so a replacement never inherits old events.
    generation: u64,
}

pub struct Session {
    entries: Vec<Entry>,
    lock: LockGate,
    next_generation: u64,
    collaborators: Collaborators,
    context: SessionContext,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl Session {
    /// Creates a session and the receiver for its updates.
    pub fn new(
        collaborators: Collaborators,
        context: SessionContext,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let session = Self {
            entries: Vec::new(),
            lock: LockGate::new(),
            next_generation: 0,
            collaborators,
            context,
            events_tx,
            events_rx,
            updates,
        };
        (session, updates_rx)
    }

    pub fn lock(&self) -> &LockGate {
        &self.lock
    }

    /// Appends a message to the log. A pending stream is opened right away,
    /// so this must run inside a tokio runtime.
    pub fn push(&mut self, message: Message) -> MessageId {
        let id = message.id.clone();
        if self.index_of(&id).is_some() {
            tracing::warn!(%id, "replacing message with duplicate id");
            self.remove(&id);
        }
        self.next_generation += 1;
        self.entries.push(Entry {
            machine: MessageMachine::new(message),
            view: ViewState::default(),
            stream: None,
            generation: self.next_generation,
        });
        self.notify(SessionUpdate::Changed(id.clone()));
        if self.phase(&id) == Some(MessagePhase::Pending) {
            self.dispatch(&id, MachineEvent::Start);
        }
        id
    }

    /// Teardown: cancels the stream, releases the lock share, drops the entry.
    ///
    /// Events still queued for `id` are ignored.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let entry = self.entries.remove(index);
        if let Some(token) = entry.stream {
            token.cancel();
        }
        if self.lock.release(id) {
            self.notify(SessionUpdate::LockChanged(false));
        }
        tracing::debug!(%id, "message removed");
        true
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|entry| entry.machine.message())
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.entry(id).map(|entry| entry.machine.message())
    }

    pub fn machine(&self, id: &MessageId) -> Option<&MessageMachine> {
        self.entry(id).map(|entry| &entry.machine)
    }

    pub fn phase(&self, id: &MessageId) -> Option<MessagePhase> {
        self.entry(id).map(|entry| entry.machine.phase())
    }

    /// True while any stream is open or about to open.
    pub fn has_active_streams(&self) -> bool {
        self.entries.iter().any(|entry| {
            matches!(
                entry.machine.phase(),
                MessagePhase::Pending | MessagePhase::Streaming
            )
        })
    }

    pub fn present(&self, id: &MessageId) -> Option<Vec<Segment>> {
        self.entry(id)
            .map(|entry| present(entry.machine.message(), entry.machine.phase(), entry.view))
    }

    pub fn view(&self, id: &MessageId) -> Option<ViewState> {
        self.entry(id).map(|entry| entry.view)
    }

    /// Returns the new state, or `None` for an unknown id.
    pub fn toggle_thought(&mut self, id: &MessageId) -> Option<bool> {
        let entry = self.entry_mut(id)?;
        entry.view.thought_expanded = !entry.view.thought_expanded;
        Some(entry.view.thought_expanded)
    }

    pub fn toggle_prompt(&mut self, id: &MessageId) -> Option<bool> {
        let entry = self.entry_mut(id)?;
        entry.view.prompt_open = !entry.view.prompt_open;
        Some(entry.view.prompt_open)
    }

    /// # Errors
    /// See [`EditError`].
    pub fn begin_edit(&mut self, id: &MessageId) -> Result<(), EditError> {
        self.dispatch_edit(id, MachineEvent::BeginEdit)
    }

    /// Sends `text` to the store; the message changes once it succeeds.
    ///
    /// # Errors
    /// See [`EditError`].
    pub fn commit_edit(&mut self, id: &MessageId, text: impl Into<String>) -> Result<(), EditError> {
        self.dispatch_edit(id, MachineEvent::CommitEdit(text.into()))
    }

    /// # Errors
    /// See [`EditError`].
    pub fn cancel_edit(&mut self, id: &MessageId) -> Result<(), EditError> {
        self.dispatch_edit(id, MachineEvent::CancelEdit)
    }

    /// Waits for the next queued event and handles it.
    pub async fn step(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Handles every event that is already queued, without waiting.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        let (id, generation) = event.target();
        if self.entry(id).is_none_or(|entry| entry.generation != generation) {
            tracing::debug!(%id, generation, "ignoring event from a removed or replaced message");
            return;
        }

        match event {
            SessionEvent::Stream { id, event, .. } => {
                let event = match event {
                    StreamEvent::Chunk(fragment) => MachineEvent::Chunk(fragment),
                    StreamEvent::Closed => MachineEvent::StreamClosed,
                    StreamEvent::Failed { message } => MachineEvent::StreamFailed { message },
                };
                self.dispatch(&id, event);
            }
            SessionEvent::StreamEnded { id, .. } => {
                if let Some(entry) = self.entry_mut(&id) {
                    entry.stream = None;
                }
            }
            SessionEvent::EditPersisted { id, text, .. } => {
                self.dispatch(&id, MachineEvent::EditPersisted { text });
            }
            SessionEvent::EditFailed { id, error, .. } => {
                tracing::warn!(%id, "message update failed: {error}");
                self.dispatch(
                    &id,
                    MachineEvent::EditRejected {
                        reason: error.to_string(),
                    },
                );
            }
        }
    }

    fn dispatch_edit(&mut self, id: &MessageId, event: MachineEvent) -> Result<(), EditError> {
        let entry = self
            .entry_mut(id)
            .ok_or_else(|| EditError::UnknownMessage(id.to_string()))?;
        let before = entry.machine.revision();
        let effects = entry.machine.apply(event)?;
        let changed = entry.machine.revision() != before;
        self.run_effects(id, effects);
        if changed {
            self.notify(SessionUpdate::Changed(id.clone()));
        }
        Ok(())
    }

    fn dispatch(&mut self, id: &MessageId, event: MachineEvent) {
        let Some(entry) = self.entry_mut(id) else {
            tracing::debug!(%id, "ignoring event for removed message");
            return;
        };
        let before = entry.machine.revision();
        let effects = match entry.machine.apply(event) {
            Ok(effects) => effects,
            Err(err) => {
                tracing::debug!(%id, "event rejected: {err}");
                return;
            }
        };
        let changed = entry.machine.revision() != before;
        self.run_effects(id, effects);
        if changed {
            self.notify(SessionUpdate::Changed(id.clone()));
        }
    }

    fn run_effects(&mut self, id: &MessageId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenStream { url } => self.open_stream(id, &url),
                Effect::CloseStream => {
                    if let Some(token) = self.entry_mut(id).and_then(|entry| entry.stream.take()) {
                        token.cancel();
                    }
                }
                Effect::AcquireLock => {
                    if self.lock.acquire(id) {
                        self.notify(SessionUpdate::LockChanged(true));
                    }
                }
                Effect::ReleaseLock => {
                    if self.lock.release(id) {
                        self.notify(SessionUpdate::LockChanged(false));
                    }
                }
                Effect::PersistFinalText { text } => {
                    self.notify(SessionUpdate::FinalText {
                        id: id.clone(),
                        text,
                    });
                }
                Effect::Alert(alert) => self.collaborators.alerts.alert(alert),
                Effect::PersistEdit { text } => self.persist_edit(id, text),
                Effect::EditApplied => {
                    self.notify(SessionUpdate::Edited(id.clone()));
                    if self.context.refetch {
                        self.notify(SessionUpdate::RefetchRequested);
                    }
                }
            }
        }
    }

    fn open_stream(&mut self, id: &MessageId, url: &str) {
        let mut handle = StreamHandle::open(self.collaborators.connector.as_ref(), url);
        let token = handle.cancel_token();
        let Some(entry) = self.entry_mut(id) else {
            handle.close();
            return;
        };
        entry.stream = Some(token);
        let generation = entry.generation;

        let tx = self.events_tx.clone();
        let id = id.clone();
        tokio::spawn(async move {
            while let Some(event) = handle.next().await {
                let terminal = event.is_terminal();
                let sent = tx.send(SessionEvent::Stream {
                    id: id.clone(),
                    generation,
                    event,
                });
                if sent.is_err() || terminal {
                    return;
                }
            }
            let _ = tx.send(SessionEvent::StreamEnded { id, generation });
        });
    }

    fn persist_edit(&self, id: &MessageId, text: String) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let message = entry.machine.message();
        let generation = entry.generation;
        let payload = UpdateMessagePayload::for_edit(
            message,
            &text,
            &self.context.flow_id,
            self.context.session_id.as_deref(),
        );
        let options = UpdateOptions {
            refetch: self.context.refetch,
        };
        let request = self.collaborators.store.update_message(payload, options);
        let tx = self.events_tx.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let event = match request.await {
                Ok(()) => SessionEvent::EditPersisted {
                    id,
                    generation,
                    text,
                },
                Err(error) => SessionEvent::EditFailed {
                    id,
                    generation,
                    error,
                },
            };
            let _ = tx.send(event);
        });
    }

    fn notify(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    fn index_of(&self, id: &MessageId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| &entry.machine.message().id == id)
    }

    fn entry(&self, id: &MessageId) -> Option<&Entry> {
        self.index_of(id).map(|index| &self.entries[index])
    }

    fn entry_mut(&mut self, id: &MessageId) -> Option<&mut Entry> {
        let index = self.index_of(id)?;
        self.entries.get_mut(index)
    }
}

#[cfg(test)]
mod tests;
