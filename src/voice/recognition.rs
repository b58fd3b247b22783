//! Speech recognition control
//!
//! [`Recognizer`] runs at most one listening session at a time on a
//! [`RecognitionEngine`] and hands the session's final transcript to a
//! callback. Engines report back through [`RecognitionEvents`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::Result;
use crate::state::AssistantState;

/// Identifies one listening session
pub type SessionId = u64;

/// Callback receiving a session's final transcript
pub type ResultCallback = Box<dyn FnOnce(String) + Send>;

/// Lifecycle events an engine reports for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Audio capture began
    Start,
    /// A transcript; interim ones are ignored
    Result { transcript: String, is_final: bool },
    /// The engine failed; a session end follows or is implied
    Error(String),
    /// The session is over
    End,
}

/// A speech-to-text capability
pub trait RecognitionEngine: Send + Sync {
    /// Whether the capability exists on this host
    fn is_supported(&self) -> bool;

    /// Begin a session, reporting through `events`
    ///
    /// # Errors
    ///
    /// Returns error if the session could not be started at all
    fn start(&self, events: RecognitionEvents) -> Result<()>;

    /// Ask the current session to end early
    fn stop(&self);
}

/// Sink an engine uses to report one session's events
#[derive(Clone)]
pub struct RecognitionEvents {
    session: SessionId,
    recognizer: Weak<Inner>,
}

impl RecognitionEvents {
    /// Session these events belong to
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event; dropped if the recognizer is gone
    pub fn emit(&self, event: RecognitionEvent) {
        if let Some(inner) = self.recognizer.upgrade() {
            Recognizer { inner }.handle_event(self.session, event);
        }
    }
}

impl std::fmt::Debug for RecognitionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionEvents")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Phase of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionPhase {
    /// No session has run yet
    Idle,
    /// Start requested, engine has not confirmed
    Starting,
    /// Engine is capturing
    Active,
    /// Session over
    Ended,
}

struct Session {
    id: SessionId,
    phase: RecognitionPhase,
    on_result: Option<ResultCallback>,
    /// `stop` arrived while the engine was still starting
    stop_requested: bool,
}

struct Inner {
    engine: Arc<dyn RecognitionEngine>,
    state: AssistantState,
    session: Mutex<Session>,
    next_id: AtomicU64,
}

/// Starts and stops listening sessions
#[derive(Clone)]
pub struct Recognizer {
    inner: Arc<Inner>,
}

impl Recognizer {
    #[must_use]
    pub fn new(engine: Arc<dyn RecognitionEngine>, state: AssistantState) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                state,
                session: Mutex::new(Session {
                    id: 0,
                    phase: RecognitionPhase::Idle,
                    on_result: None,
                    stop_requested: false,
                }),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Begin listening; `on_result` gets the session's final transcript
    ///
    /// Silently ignored while already listening, while speaking, or when
    /// the engine is unsupported.
    pub fn start<F>(&self, on_result: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let inner = &self.inner;
        if !inner.engine.is_supported() {
            tracing::debug!("speech recognition unsupported, ignoring start");
            return;
        }

        let events = {
            let mut session = inner.session.lock();
            let status = inner.state.status();
            if status.listening || status.speaking {
                tracing::debug!(
                    listening = status.listening,
                    speaking = status.speaking,
                    "busy, ignoring start"
                );
                return;
            }

            let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
            *session = Session {
                id,
                phase: RecognitionPhase::Starting,
                on_result: Some(Box::new(on_result)),
                stop_requested: false,
            };
            inner.state.set_listening(true);

            RecognitionEvents {
                session: id,
                recognizer: Arc::downgrade(inner),
            }
        };

        let id = events.session();
        tracing::debug!(session = id, "starting recognition");

        if let Err(e) = inner.engine.start(events) {
            tracing::error!(session = id, error = %e, "failed to start recognition");
            self.end_session(id);
            return;
        }

        // A stop that raced the engine start may have found nothing to stop
        let restop = {
            let session = inner.session.lock();
            session.id == id
                && session.stop_requested
                && matches!(
                    session.phase,
                    RecognitionPhase::Starting | RecognitionPhase::Active
                )
        };
        if restop {
            tracing::debug!(session = id, "repeating stop requested during start");
            inner.engine.stop();
        }
    }

    /// Request early termination of the current session
    ///
    /// The listening flag clears when the engine reports the session end.
    pub fn stop(&self) {
        let running = {
            let mut session = self.inner.session.lock();
            let running = matches!(
                session.phase,
                RecognitionPhase::Starting | RecognitionPhase::Active
            );
            session.stop_requested |= running;
            running
        };
        if running {
            tracing::debug!("stopping recognition");
            self.inner.engine.stop();
        }
    }

    /// Phase of the most recent session
    #[must_use]
    pub fn phase(&self) -> RecognitionPhase {
        self.inner.session.lock().phase
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.state.is_listening()
    }

    fn handle_event(&self, id: SessionId, event: RecognitionEvent) {
        let deliver = {
            let mut session = self.inner.session.lock();
            if session.id != id || session.phase == RecognitionPhase::Ended {
                tracing::trace!(session = id, ?event, "ignoring stale recognition event");
                return;
            }

            match event {
                RecognitionEvent::Start => {
                    session.phase = RecognitionPhase::Active;
                    self.inner.state.set_listening(true);
                    tracing::debug!(session = id, "recognition started");
                    None
                }
                RecognitionEvent::Result {
                    is_final: false, ..
                } => None,
                RecognitionEvent::Result {
                    transcript,
                    is_final: true,
                } => {
                    let transcript = transcript.trim().to_string();
                    if transcript.is_empty() {
                        None
                    } else {
                        session.on_result.take().map(|cb| (cb, transcript))
                    }
                }
                RecognitionEvent::Error(message) => {
                    tracing::error!(session = id, error = %message, "speech recognition error");
                    session.phase = RecognitionPhase::Ended;
                    session.on_result = None;
                    self.inner.state.set_listening(false);
                    None
                }
                RecognitionEvent::End => {
                    tracing::debug!(session = id, "recognition ended");
                    session.phase = RecognitionPhase::Ended;
                    session.on_result = None;
                    self.inner.state.set_listening(false);
                    None
                }
            }
        };

        // Outside the lock so the callback may start a new session
        if let Some((callback, transcript)) = deliver {
            tracing::info!(session = id, transcript = %transcript, "final transcript");
            callback(transcript);
        }
    }

    fn end_session(&self, id: SessionId) {
        let mut session = self.inner.session.lock();
        if session.id == id {
            session.phase = RecognitionPhase::Ended;
            session.on_result = None;
            self.inner.state.set_listening(false);
        }
    }
}

impl std::fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
