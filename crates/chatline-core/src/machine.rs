//! Message state machine.
//!
//! All changes to a message go through [`MessageMachine::apply`], which
//! mutates state and returns effects for the session runtime to execute.
//! The machine itself never performs I/O.

use std::borrow::Cow;
use std::fmt;

use chatline_types::Message;

use crate::alert::{Alert, STREAM_ERROR_TITLE, UPDATE_ERROR_TITLE};
use crate::decode::{decode_display_text, is_empty_text};
use crate::edit::{CommitSlot, EditError, EditSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePhase {
    /// Has a stream URL, not yet connected.
    Pending,
    Streaming,
    Settled,
    /// The stream ended abnormally; partial text is kept.
    Errored,
    Editing,
}

impl fmt::Display for MessagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagePhase::Pending => write!(f, "pending"),
            MessagePhase::Streaming => write!(f, "streaming"),
            MessagePhase::Settled => write!(f, "settled"),
            MessagePhase::Errored => write!(f, "errored"),
            MessagePhase::Editing => write!(f, "editing"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    /// Connect the pending stream.
    Start,
    Chunk(String),
    StreamClosed,
    StreamFailed { message: Option<String> },
    BeginEdit,
    CommitEdit(String),
    CancelEdit,
    /// The store accepted the commit carrying `text`.
    EditPersisted { text: String },
    /// The store rejected the pending commit.
    EditRejected { reason: String },
}

/// Side effects for the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenStream { url: String },
    CloseStream,
    /// Take (or refresh) this message's share of the session lock.
    AcquireLock,
    ReleaseLock,
    /// Report the text a stream settled with.
    PersistFinalText { text: String },
    Alert(Alert),
    /// Send the edited text to the store.
    PersistEdit { text: String },
    /// An edit was persisted and applied.
    EditApplied,
}

/// One message plus its lifecycle state.
#[derive(Debug, Clone)]
pub struct MessageMachine {
    message: Message,
    phase: MessagePhase,
    edit: Option<EditSession>,
    commit: CommitSlot,
    revision: u64,
}

impl MessageMachine {
    /// Messages with a stream URL start `Pending`; everything else is settled.
    ///
    /// The stream URL is only kept while a stream is still to come.
    pub fn new(mut message: Message) -> Self {
        let phase = if message.stream_url.is_some() && !message.is_error() {
            MessagePhase::Pending
        } else {
            message.stream_url = None;
            MessagePhase::Settled
        };
        Self {
            message,
            phase,
            edit: None,
            commit: CommitSlot::default(),
            revision: 0,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn phase(&self) -> MessagePhase {
        self.phase
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        self.edit.as_ref()
    }

    /// Text of the commit awaiting the store.
    pub fn pending_commit(&self) -> Option<&str> {
        self.commit.pending()
    }

    /// Bumped on every state change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Decoded text, falling back to the raw text.
    pub fn display_text(&self) -> Cow<'_, str> {
        decode_display_text(&self.message.text)
    }

    pub fn is_empty(&self) -> bool {
        is_empty_text(&self.display_text())
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == MessagePhase::Streaming
    }

    /// Applies one event.
    ///
    /// Stream events that do not fit the current phase are ignored and yield
    /// no effects.
    ///
    /// # Errors
    /// Edit events return [`EditError`] when the edit is not allowed; the
    /// state is left untouched.
    pub fn apply(&mut self, event: MachineEvent) -> Result<Vec<Effect>, EditError> {
        let effects = match event {
            MachineEvent::Start => self.start(),
            MachineEvent::Chunk(fragment) => self.append(&fragment),
            MachineEvent::StreamClosed => self.settle(MessagePhase::Settled, None),
            MachineEvent::StreamFailed { message } => {
                self.settle(MessagePhase::Errored, Some(message))
            }
            MachineEvent::BeginEdit => self.begin_edit()?,
            MachineEvent::CommitEdit(text) => self.commit_edit(&text)?,
            MachineEvent::CancelEdit => self.cancel_edit()?,
            MachineEvent::EditPersisted { text } => self.edit_persisted(text),
            MachineEvent::EditRejected { reason } => self.edit_rejected(reason),
        };
        Ok(effects)
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn start(&mut self) -> Vec<Effect> {
        if self.phase != MessagePhase::Pending {
            return vec![];
        }
        let Some(url) = self.message.stream_url.clone() else {
            return vec![];
        };
        self.phase = MessagePhase::Streaming;
        self.touch();
        vec![Effect::AcquireLock, Effect::OpenStream { url }]
    }

    fn append(&mut self, fragment: &str) -> Vec<Effect> {
        if self.phase != MessagePhase::Streaming {
            tracing::debug!(id = %self.message.id, phase = %self.phase, "ignoring chunk");
            return vec![];
        }
        self.message.text.push_str(fragment);
        self.touch();
        vec![Effect::AcquireLock]
    }

    /// `failure` is `Some` for an abnormal end, carrying the optional server message.
    fn settle(&mut self, phase: MessagePhase, failure: Option<Option<String>>) -> Vec<Effect> {
        if self.phase != MessagePhase::Streaming {
            tracing::debug!(id = %self.message.id, phase = %self.phase, "ignoring stream end");
            return vec![];
        }
        self.phase = phase;
        self.message.stream_url = None;
        self.touch();

        let mut effects = vec![Effect::CloseStream, Effect::ReleaseLock];
        if let Some(Some(message)) = failure {
            effects.push(Effect::Alert(Alert::new(STREAM_ERROR_TITLE, vec![message])));
        }
        effects.push(Effect::PersistFinalText {
            text: self.message.text.clone(),
        });
        effects
    }

    fn begin_edit(&mut self) -> Result<Vec<Effect>, EditError> {
        if self.message.is_error() {
            return Err(EditError::ErrorMessage);
        }
        if self.phase != MessagePhase::Settled {
            return Err(EditError::NotEditable(self.phase));
        }
        self.edit = Some(EditSession {
            snapshot: self.display_text().into_owned(),
        });
        self.phase = MessagePhase::Editing;
        self.touch();
        Ok(vec![])
    }

    fn commit_edit(&mut self, text: &str) -> Result<Vec<Effect>, EditError> {
        if self.phase != MessagePhase::Editing {
            return Err(EditError::NotEditing);
        }
        self.commit.submit(text)?;
        self.touch();
        Ok(vec![Effect::PersistEdit {
            text: text.to_string(),
        }])
    }

    fn cancel_edit(&mut self) -> Result<Vec<Effect>, EditError> {
        if self.phase != MessagePhase::Editing {
            return Err(EditError::NotEditing);
        }
        if let Some(pending) = self.commit.pending() {
            tracing::debug!(id = %self.message.id, pending, "edit cancelled with a commit in flight");
        }
        self.edit = None;
        self.phase = MessagePhase::Settled;
        self.touch();
        Ok(vec![])
    }

    /// Applies the persisted text, even if the edit was cancelled meanwhile:
    /// the store already holds it.
    fn edit_persisted(&mut self, text: String) -> Vec<Effect> {
        if self.commit.resolve().is_none() {
            tracing::debug!(id = %self.message.id, "ignoring edit result without a pending commit");
            return vec![];
        }
        self.message.text = text;
        self.message.edited = true;
        if self.phase == MessagePhase::Editing {
            self.edit = None;
            self.phase = MessagePhase::Settled;
        }
        self.touch();
        vec![Effect::EditApplied]
    }

    fn edit_rejected(&mut self, reason: String) -> Vec<Effect> {
        if self.commit.resolve().is_none() {
            tracing::debug!(id = %self.message.id, "ignoring edit failure without a pending commit");
            return vec![];
        }
        if self.phase != MessagePhase::Editing {
            tracing::debug!(id = %self.message.id, "edit rejected after cancel");
        }
        self.touch();
        vec![Effect::Alert(Alert::new(UPDATE_ERROR_TITLE, vec![reason]))]
    }
}

#[cfg(test)]
mod tests {
    use chatline_types::ErrorBlock;

    use super::*;

    fn streaming() -> MessageMachine {
        let mut machine = MessageMachine::new(Message::machine_streaming("/stream/1"));
        machine.apply(MachineEvent::Start).unwrap();
        machine
    }

    fn settled(text: &str) -> MessageMachine {
        MessageMachine::new(Message::machine(text))
    }

    #[test]
    fn test_initial_phase() {
        assert_eq!(
            MessageMachine::new(Message::machine_streaming("/s")).phase(),
            MessagePhase::Pending
        );
        assert_eq!(settled("hi").phase(), MessagePhase::Settled);
        assert_eq!(
            MessageMachine::new(Message::error(ErrorBlock::default())).phase(),
            MessagePhase::Settled
        );
    }

    #[test]
    fn test_error_message_never_keeps_stream_url() {
        let mut message = Message::error(ErrorBlock::default());
        message.stream_url = Some("/s".into());

        let machine = MessageMachine::new(message);
        assert_eq!(machine.phase(), MessagePhase::Settled);
        assert_eq!(machine.message().stream_url, None);
        assert_eq!(
            MessageMachine::new(Message::machine_streaming("/s"))
                .message()
                .stream_url
                .as_deref(),
            Some("/s")
        );
    }

    #[test]
    fn test_start_opens_stream_and_locks() {
        let mut machine = MessageMachine::new(Message::machine_streaming("/s"));
        let effects = machine.apply(MachineEvent::Start).unwrap();
        assert_eq!(
            effects,
            vec![Effect::AcquireLock, Effect::OpenStream { url: "/s".into() }]
        );
        assert_eq!(machine.phase(), MessagePhase::Streaming);
        assert!(machine.apply(MachineEvent::Start).unwrap().is_empty());
    }

    #[test]
    fn test_chunks_then_close_settle_with_concatenation() {
        let mut machine = streaming();
        for chunk in ["Hel", "lo, ", "world"] {
            let effects = machine.apply(MachineEvent::Chunk(chunk.into())).unwrap();
            assert_eq!(effects, vec![Effect::AcquireLock]);
        }
        let effects = machine.apply(MachineEvent::StreamClosed).unwrap();

        assert_eq!(machine.phase(), MessagePhase::Settled);
        assert_eq!(machine.message().text, "Hello, world");
        assert_eq!(machine.message().stream_url, None);
        assert_eq!(
            effects,
            vec![
                Effect::CloseStream,
                Effect::ReleaseLock,
                Effect::PersistFinalText {
                    text: "Hello, world".into()
                },
            ]
        );
    }

    #[test]
    fn test_failure_keeps_partial_text_and_alerts() {
        let mut machine = streaming();
        machine.apply(MachineEvent::Chunk("partial".into())).unwrap();
        let effects = machine
            .apply(MachineEvent::StreamFailed {
                message: Some("flow crashed".into()),
            })
            .unwrap();

        assert_eq!(machine.phase(), MessagePhase::Errored);
        assert_eq!(machine.message().text, "partial");
        assert_eq!(
            effects,
            vec![
                Effect::CloseStream,
                Effect::ReleaseLock,
                Effect::Alert(Alert::new(STREAM_ERROR_TITLE, vec!["flow crashed".into()])),
                Effect::PersistFinalText {
                    text: "partial".into()
                },
            ]
        );
    }

    #[test]
    fn test_failure_without_message_does_not_alert() {
        let mut machine = streaming();
        let effects = machine
            .apply(MachineEvent::StreamFailed { message: None })
            .unwrap();
        assert!(!effects.iter().any(|e| matches!(e, Effect::Alert(_))));
        assert!(effects.contains(&Effect::ReleaseLock));
    }

    #[test]
    fn test_events_after_settle_are_ignored() {
        let mut machine = streaming();
        machine.apply(MachineEvent::Chunk("done".into())).unwrap();
        machine.apply(MachineEvent::StreamClosed).unwrap();
        let revision = machine.revision();

        assert!(machine.apply(MachineEvent::Chunk("late".into())).unwrap().is_empty());
        assert!(machine.apply(MachineEvent::StreamClosed).unwrap().is_empty());
        assert!(
            machine
                .apply(MachineEvent::StreamFailed { message: Some("x".into()) })
                .unwrap()
                .is_empty()
        );
        assert_eq!(machine.message().text, "done");
        assert_eq!(machine.revision(), revision);
    }

    #[test]
    fn test_display_text_is_decoded_defensively() {
        assert_eq!(settled("a%20b").display_text(), "a b");
        assert_eq!(settled("50% off").display_text(), "50% off");
        assert!(settled(" %20 ").is_empty());
    }

    #[test]
    fn test_begin_edit_rules() {
        let mut pending = MessageMachine::new(Message::machine_streaming("/s"));
        assert_eq!(
            pending.apply(MachineEvent::BeginEdit),
            Err(EditError::NotEditable(MessagePhase::Pending))
        );

        let mut live = streaming();
        assert_eq!(
            live.apply(MachineEvent::BeginEdit),
            Err(EditError::NotEditable(MessagePhase::Streaming))
        );

        live.apply(MachineEvent::StreamFailed { message: None }).unwrap();
        assert_eq!(
            live.apply(MachineEvent::BeginEdit),
            Err(EditError::NotEditable(MessagePhase::Errored))
        );

        let mut error = MessageMachine::new(Message::error(ErrorBlock::default()));
        assert_eq!(error.apply(MachineEvent::BeginEdit), Err(EditError::ErrorMessage));

        let mut ok = settled("hi%21");
        ok.apply(MachineEvent::BeginEdit).unwrap();
        assert_eq!(ok.phase(), MessagePhase::Editing);
        assert_eq!(ok.edit_session().unwrap().snapshot, "hi!");
    }

    #[test]
    fn test_commit_success_sets_text_and_flag() {
        let mut machine = settled("old");
        machine.apply(MachineEvent::BeginEdit).unwrap();
        let effects = machine.apply(MachineEvent::CommitEdit("new".into())).unwrap();
        assert_eq!(effects, vec![Effect::PersistEdit { text: "new".into() }]);

        // Not observable before the store answers.
        assert_eq!(machine.message().text, "old");
        assert!(!machine.message().edited);

        let effects = machine
            .apply(MachineEvent::EditPersisted { text: "new".into() })
            .unwrap();
        assert_eq!(effects, vec![Effect::EditApplied]);
        assert_eq!(machine.phase(), MessagePhase::Settled);
        assert_eq!(machine.message().text, "new");
        assert!(machine.message().edited);
    }

    #[test]
    fn test_commit_failure_keeps_snapshot() {
        let mut machine = settled("old");
        machine.apply(MachineEvent::BeginEdit).unwrap();
        machine.apply(MachineEvent::CommitEdit("new".into())).unwrap();
        let effects = machine
            .apply(MachineEvent::EditRejected {
                reason: "HTTP 500".into(),
            })
            .unwrap();

        assert_eq!(
            effects,
            vec![Effect::Alert(Alert::new(UPDATE_ERROR_TITLE, vec!["HTTP 500".into()]))]
        );
        assert_eq!(machine.phase(), MessagePhase::Editing);
        assert_eq!(machine.message().text, "old");
        assert!(!machine.message().edited);
        assert_eq!(machine.edit_session().unwrap().snapshot, "old");
        assert_eq!(machine.pending_commit(), None);

        // Retry is allowed after a rejection.
        assert!(machine.apply(MachineEvent::CommitEdit("again".into())).is_ok());
    }

    #[test]
    fn test_commit_is_single_flight() {
        let mut machine = settled("old");
        machine.apply(MachineEvent::BeginEdit).unwrap();
        machine.apply(MachineEvent::CommitEdit("one".into())).unwrap();
        assert_eq!(
            machine.apply(MachineEvent::CommitEdit("two".into())),
            Err(EditError::CommitInFlight)
        );
    }

    #[test]
    fn test_cancel_does_not_release_pending_commit() {
        let mut machine = settled("old");
        machine.apply(MachineEvent::BeginEdit).unwrap();
        machine.apply(MachineEvent::CommitEdit("one".into())).unwrap();
        machine.apply(MachineEvent::CancelEdit).unwrap();
        machine.apply(MachineEvent::BeginEdit).unwrap();
        assert_eq!(
            machine.apply(MachineEvent::CommitEdit("two".into())),
            Err(EditError::CommitInFlight)
        );

        // The store accepted the first commit after all.
        machine
            .apply(MachineEvent::EditPersisted { text: "one".into() })
            .unwrap();
        assert_eq!(machine.phase(), MessagePhase::Settled);
        assert_eq!(machine.message().text, "one");
        assert!(machine.message().edited);
    }

    #[test]
    fn test_cancel_restores_settled_text() {
        let mut machine = settled("keep");
        machine.apply(MachineEvent::BeginEdit).unwrap();
        machine.apply(MachineEvent::CancelEdit).unwrap();
        assert_eq!(machine.phase(), MessagePhase::Settled);
        assert_eq!(machine.message().text, "keep");
        assert!(!machine.message().edited);
        assert_eq!(machine.apply(MachineEvent::CancelEdit), Err(EditError::NotEditing));
        assert_eq!(
            machine.apply(MachineEvent::CommitEdit("x".into())),
            Err(EditError::NotEditing)
        );
    }
}
