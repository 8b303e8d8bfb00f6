//! Edit-mode bookkeeping for one message.

use std::fmt;

use crate::machine::MessagePhase;

/// State held while a message is in [`MessagePhase::Editing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    /// Decoded text at the moment editing began.
    pub snapshot: String,
}

/// The commit awaiting the store, if any.
///
/// Outlives the edit session: a cancelled edit may still have a commit in
/// flight, and no second commit may be issued until it resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSlot(Option<String>);

impl CommitSlot {
    /// # Errors
    /// Returns [`EditError::CommitInFlight`] if a commit is already pending.
    pub fn submit(&mut self, text: &str) -> Result<(), EditError> {
        if self.0.is_some() {
            return Err(EditError::CommitInFlight);
        }
        self.0 = Some(text.to_string());
        Ok(())
    }

    /// Clears the slot once the store answered.
    pub fn resolve(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn pending(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Why an edit operation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// Editing is not possible in this phase (pending, streaming, errored).
    NotEditable(MessagePhase),
    /// Structured error messages are never edited.
    ErrorMessage,
    /// `commit`/`cancel` without a preceding `begin_edit`.
    NotEditing,
    /// A commit for this message is still awaiting the store.
    CommitInFlight,
    /// No message with this id in the session.
    UnknownMessage(String),
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::NotEditable(phase) => write!(f, "cannot edit a message that is {phase}"),
            EditError::ErrorMessage => write!(f, "error messages cannot be edited"),
            EditError::NotEditing => write!(f, "message is not being edited"),
            EditError::CommitInFlight => write!(f, "an update for this message is already pending"),
            EditError::UnknownMessage(id) => write!(f, "unknown message {id}"),
        }
    }
}

impl std::error::Error for EditError {}
