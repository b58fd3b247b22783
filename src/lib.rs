//! Papo - voice-driven assistant front-end
//!
//! This library provides the pieces of a spoken conversation loop:
//! - Speech recognition control (one final transcript per listening session)
//! - A streaming chat client for a hosted language model
//! - A speech output queue that plays utterances one at a time
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  transcript  ┌──────────────┐  fragments  ┌──────────────┐
//! │  Recognizer  │ ───────────▶ │  ChatClient  │ ──────────▶ │ SpeechQueue  │
//! │ (mic + STT)  │              │ (SSE stream) │             │ (TTS + play) │
//! └──────┬───────┘              └──────┬───────┘             └──────┬───────┘
//!        │ listening                   │ ready                      │ speaking
//!        └─────────────────────▶ AssistantState ◀──────────────────┘
//! ```

pub mod assistant;
pub mod chat;
pub mod config;
pub mod error;
pub mod prompt;
pub mod state;
pub mod voice;

pub use assistant::Assistant;
pub use chat::{ChatClient, ChatSession, FragmentStream};
pub use config::Config;
pub use error::{Error, Result};
pub use state::{AssistantState, Status};
pub use voice::{Recognizer, SpeechQueue};
