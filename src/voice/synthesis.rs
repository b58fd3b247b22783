//! Speech output queue
//!
//! [`SpeechQueue`] serializes speak requests into a FIFO that a
//! [`SynthesisEngine`] drains one utterance at a time. The engine reports
//! each utterance's lifecycle through [`SynthesisEvents`]; a terminal event
//! (end or error) starts the next queued utterance.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::state::AssistantState;

/// Identifies one utterance
pub type UtteranceId = u64;

/// One unit of text submitted for speech synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    /// BCP 47 locale; engines that detect the language from the text may
    /// ignore it
    pub locale: String,
    /// Speed relative to the engine's baseline
    pub rate: f32,
}

/// Lifecycle events an engine reports for an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// Audio started
    Start,
    /// Audio finished naturally
    End,
    /// Synthesis or playback failed, or was interrupted by a cancel
    Error(String),
}

/// A text-to-speech capability
pub trait SynthesisEngine: Send + Sync {
    /// Whether the capability exists on this host
    fn is_supported(&self) -> bool;

    /// Whether the engine is currently producing audio
    fn is_speaking(&self) -> bool;

    /// Speak one utterance, reporting through `events`
    ///
    /// Exactly one terminal event (`End` or `Error`) must follow.
    fn speak(&self, utterance: Utterance, events: SynthesisEvents);

    /// Stop whatever is playing; best effort
    fn cancel(&self);
}

/// Sink an engine uses to report one utterance's events
#[derive(Clone)]
pub struct SynthesisEvents {
    utterance: UtteranceId,
    queue: Weak<Inner>,
}

impl SynthesisEvents {
    /// Utterance these events belong to
    #[must_use]
    pub const fn utterance(&self) -> UtteranceId {
        self.utterance
    }

    /// Deliver an event; dropped if the queue is gone
    pub fn emit(&self, event: SynthesisEvent) {
        if let Some(inner) = self.queue.upgrade() {
            SpeechQueue { inner }.handle_event(self.utterance, event);
        }
    }
}

impl std::fmt::Debug for SynthesisEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisEvents")
            .field("utterance", &self.utterance)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Utterance>,
    /// Utterance handed to the engine and not yet terminated
    active: Option<UtteranceId>,
    /// Utterances interrupted by `cancel` whose terminal event is still due
    cancelling: HashSet<UtteranceId>,
}

struct Inner {
    engine: Arc<dyn SynthesisEngine>,
    state: AssistantState,
    locale: String,
    rate: f32,
    queue: Mutex<QueueState>,
    next_id: AtomicU64,
}

/// FIFO of utterances, played one at a time
#[derive(Clone)]
pub struct SpeechQueue {
    inner: Arc<Inner>,
}

impl SpeechQueue {
    #[must_use]
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        state: AssistantState,
        locale: impl Into<String>,
        rate: f32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                state,
                locale: locale.into(),
                rate,
                queue: Mutex::new(QueueState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Queue text to be spoken
    ///
    /// Blank text and unsupported engines are ignored.
    pub fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.inner.engine.is_supported() {
            tracing::debug!("speech synthesis unsupported, ignoring speak");
            return;
        }

        let utterance = Utterance {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            text: text.to_string(),
            locale: self.inner.locale.clone(),
            rate: self.inner.rate,
        };
        tracing::debug!(utterance = utterance.id, text, "queueing utterance");

        {
            let mut queue = self.inner.queue.lock();
            queue.pending.push_back(utterance);
            self.inner.state.set_speaking(true);
        }

        self.drain();
    }

    /// Drop every queued utterance and stop the current one
    pub fn cancel(&self) {
        {
            let mut queue = self.inner.queue.lock();
            let dropped = queue.pending.len();
            queue.pending.clear();
            if let Some(id) = queue.active.take() {
                queue.cancelling.insert(id);
            }
            self.inner.state.set_speaking(false);
            tracing::debug!(dropped, cancelling = ?queue.cancelling, "speech cancelled");
        }

        self.inner.engine.cancel();
    }

    /// Number of utterances waiting to play
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().pending.len()
    }

    /// Utterance currently handed to the engine
    #[must_use]
    pub fn active(&self) -> Option<UtteranceId> {
        self.inner.queue.lock().active
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.inner.state.is_speaking()
    }

    /// Start the next utterance if nothing is playing
    fn drain(&self) {
        let engine_busy = self.inner.engine.is_speaking();

        let next = {
            let mut queue = self.inner.queue.lock();
            if queue.active.is_some() || engine_busy {
                return;
            }
            let Some(next) = queue.pending.pop_front() else {
                return;
            };
            queue.active = Some(next.id);
            next
        };

        let events = SynthesisEvents {
            utterance: next.id,
            queue: Arc::downgrade(&self.inner),
        };
        tracing::debug!(utterance = next.id, "speaking");
        self.inner.engine.speak(next, events);
    }

    fn handle_event(&self, id: UtteranceId, event: SynthesisEvent) {
        {
            let mut queue = self.inner.queue.lock();
            let was_cancelled = queue.cancelling.contains(&id);

            match &event {
                SynthesisEvent::Start => {
                    if queue.active == Some(id) {
                        tracing::trace!(utterance = id, "utterance started");
                        self.inner.state.set_speaking(true);
                    }
                    return;
                }
                SynthesisEvent::End => {
                    tracing::trace!(utterance = id, "utterance ended");
                }
                SynthesisEvent::Error(message) if was_cancelled => {
                    tracing::debug!(utterance = id, reason = %message, "utterance interrupted");
                }
                SynthesisEvent::Error(message) => {
                    tracing::error!(utterance = id, error = %message, "speech synthesis error");
                }
            }

            if was_cancelled {
                queue.cancelling.remove(&id);
            }

            if queue.active == Some(id) {
                queue.active = None;
                if queue.pending.is_empty() {
                    self.inner.state.set_speaking(false);
                }
            }
        }

        // A stale terminal event may also free an engine that was busy
        self.drain();
    }
}

impl std::fmt::Debug for SpeechQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = self.inner.queue.lock();
        f.debug_struct("SpeechQueue")
            .field("pending", &queue.pending.len())
            .field("active", &queue.active)
            .finish_non_exhaustive()
    }
}
