//! Per-session input lock, held while any message streams.

use std::collections::HashSet;
use std::sync::Arc;

use chatline_types::MessageId;
use tokio::sync::watch;

/// Reference-counted gate keyed by the streaming messages' ids.
///
/// Locked iff at least one message holds a share. Clones share state.
#[derive(Debug, Clone)]
pub struct LockGate {
    streaming: Arc<watch::Sender<HashSet<MessageId>>>,
}

impl Default for LockGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LockGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HashSet::new());
        Self {
            streaming: Arc::new(tx),
        }
    }

    /// Takes a share for `id`; repeated calls for the same id are no-ops.
    ///
    /// Returns `true` if the gate went from unlocked to locked.
    pub fn acquire(&self, id: &MessageId) -> bool {
        let mut became_locked = false;
        self.streaming.send_if_modified(|streaming| {
            let was_unlocked = streaming.is_empty();
            let inserted = streaming.insert(id.clone());
            became_locked = was_unlocked && inserted;
            inserted
        });
        became_locked
    }

    /// Drops the share held by `id`, if any.
    ///
    /// Returns `true` if the gate went from locked to unlocked.
    pub fn release(&self, id: &MessageId) -> bool {
        let mut became_unlocked = false;
        self.streaming.send_if_modified(|streaming| {
            let removed = streaming.remove(id);
            became_unlocked = removed && streaming.is_empty();
            removed
        });
        became_unlocked
    }

    pub fn is_locked(&self) -> bool {
        !self.streaming.borrow().is_empty()
    }

    pub fn holds(&self, id: &MessageId) -> bool {
        self.streaming.borrow().contains(id)
    }

    /// Number of messages currently holding a share.
    pub fn streaming_count(&self) -> usize {
        self.streaming.borrow().len()
    }

    pub fn subscribe(&self) -> LockWatch {
        let rx = self.streaming.subscribe();
        let locked = !rx.borrow().is_empty();
        LockWatch { rx, locked }
    }
}

/// Observes lock transitions.
#[derive(Debug)]
pub struct LockWatch {
    rx: watch::Receiver<HashSet<MessageId>>,
    locked: bool,
}

impl LockWatch {
    pub fn is_locked(&self) -> bool {
        !self.rx.borrow().is_empty()
    }

    /// Waits until the locked state differs from the last one seen.
    ///
    /// Returns the new state, or `None` once the gate is gone.
    pub async fn changed(&mut self) -> Option<bool> {
        loop {
            self.rx.changed().await.ok()?;
            let locked = !self.rx.borrow_and_update().is_empty();
            if locked != self.locked {
                self.locked = locked;
                return Some(locked);
            }
        }
    }
}
