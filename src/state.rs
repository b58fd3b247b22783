//! Observable assistant status flags
//!
//! The three flags are meant for UI binding. Writers go through
//! [`AssistantState`]; readers either poll [`AssistantState::status`] or
//! hold a [`watch::Receiver`] from [`AssistantState::subscribe`].

use std::sync::Arc;

use tokio::sync::watch;

/// Snapshot of the assistant flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    /// Chat session created and usable
    pub ready: bool,
    /// A recognition session is active
    pub listening: bool,
    /// An utterance is playing or queued
    pub speaking: bool,
}

/// Shared, cheaply cloneable handle to the status flags
#[derive(Debug, Clone)]
pub struct AssistantState {
    tx: Arc<watch::Sender<Status>>,
}

impl Default for AssistantState {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantState {
    /// Create state with every flag cleared
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot
    #[must_use]
    pub fn status(&self) -> Status {
        *self.tx.borrow()
    }

    /// Subscribe to flag changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status().ready
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.status().listening
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.status().speaking
    }

    pub fn set_ready(&self, value: bool) {
        self.update(|s| &mut s.ready, value);
    }

    pub fn set_listening(&self, value: bool) {
        self.update(|s| &mut s.listening, value);
    }

    pub fn set_speaking(&self, value: bool) {
        self.update(|s| &mut s.speaking, value);
    }

    /// Write one flag, notifying subscribers only on change
    fn update(&self, field: impl Fn(&mut Status) -> &mut bool, value: bool) {
        self.tx.send_if_modified(|status| {
            let flag = field(status);
            let changed = *flag != value;
            *flag = value;
            changed
        });
    }
}
