//! Conversation wiring: transcript → chat → speech

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::chat::ChatClient;
use crate::config::Config;
use crate::prompt::build_system_prompt;
use crate::state::AssistantState;
use crate::voice::{
    RecognitionEngine, Recognizer, SentenceChunker, SpeechQueue, SynthesisEngine,
};
use crate::Result;

/// The assembled assistant
///
/// Owns the chat client, the recognizer and the speech queue, all sharing
/// one [`AssistantState`].
pub struct Assistant {
    state: AssistantState,
    chat: ChatClient,
    recognizer: Recognizer,
    speech: SpeechQueue,
}

impl Assistant {
    /// Assemble an assistant from config and the two speech engines
    #[must_use]
    pub fn new(
        config: &Config,
        recognition: Arc<dyn RecognitionEngine>,
        synthesis: Arc<dyn SynthesisEngine>,
    ) -> Self {
        let state = AssistantState::new();
        let prompt = build_system_prompt(&config.voice.locale);
        let chat = ChatClient::new(config, &prompt, &state);
        let recognizer = Recognizer::new(recognition, state.clone());
        let speech = SpeechQueue::new(
            synthesis,
            state.clone(),
            config.voice.locale.clone(),
            config.voice.tts_speed,
        );

        Self {
            state,
            chat,
            recognizer,
            speech,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &AssistantState {
        &self.state
    }

    #[must_use]
    pub const fn chat(&self) -> &ChatClient {
        &self.chat
    }

    #[must_use]
    pub const fn recognizer(&self) -> &Recognizer {
        &self.recognizer
    }

    #[must_use]
    pub const fn speech(&self) -> &SpeechQueue {
        &self.speech
    }

    /// Start a listening session that forwards its transcript to `tx`
    ///
    /// A no-op while listening or speaking, like [`Recognizer::start`].
    pub fn listen(&self, tx: mpsc::UnboundedSender<String>) {
        self.recognizer.start(move |transcript| {
            if tx.send(transcript).is_err() {
                tracing::debug!("transcript receiver dropped");
            }
        });
    }

    /// Send `message`, speaking the reply sentence by sentence as it streams
    ///
    /// `on_fragment` sees every raw fragment, for display. Returns the full
    /// reply text.
    ///
    /// # Errors
    ///
    /// Returns error if chat is not initialized or the stream fails
    pub async fn converse<F>(&self, message: &str, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        tracing::info!(message, "processing message");

        let mut stream = self.chat.send(message)?;
        let mut chunker = SentenceChunker::new();
        let mut reply = String::new();

        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            reply.push_str(&fragment);
            for sentence in chunker.push(&fragment) {
                self.speech.speak(&sentence);
            }
        }

        if let Some(rest) = chunker.finish() {
            self.speech.speak(&rest);
        }

        tracing::debug!(reply_len = reply.len(), "reply complete");
        Ok(reply)
    }
}
