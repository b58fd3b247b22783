//! Streaming chat client for the hosted language model
//!
//! A [`ChatClient`] owns at most one [`ChatSession`], created at startup when
//! an API key is available. The session lives as long as the client and keeps
//! the conversation history so each turn has context.

mod sse;
pub mod types;

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;

pub use sse::SseDecoder;
use types::{Content, GenerateContentRequest, GenerateContentResponse, Tool};

use crate::config::{ChatConfig, Config};
use crate::state::AssistantState;
use crate::{Error, Result};

/// Lazy, forward-only sequence of reply fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A long-lived conversation with the remote model
pub struct ChatSession {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_instruction: Content,
    tools: Vec<Tool>,
    history: Mutex<Vec<Content>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("turns", &self.history.lock().len())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a session for a model with a fixed system prompt
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &ChatConfig, api_key: String, system_prompt: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Gemini API key required for chat".to_string()));
        }

        let endpoint = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        let tools = if config.web_search {
            vec![Tool::default()]
        } else {
            Vec::new()
        };

        tracing::debug!(model = %config.model, web_search = config.web_search, "chat session created");

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model: config.model.clone(),
            system_instruction: Content::system(system_prompt),
            tools,
            history: Mutex::new(Vec::new()),
        })
    }

    /// Model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Copy of the conversation so far
    #[must_use]
    pub fn history(&self) -> Vec<Content> {
        self.history.lock().clone()
    }

    /// Stream the reply to one user message
    ///
    /// Nothing is sent until the stream is first polled. The exchange is
    /// appended to the history only if the stream runs to completion.
    fn stream(self: &Arc<Self>, message: String) -> FragmentStream {
        let session = Arc::clone(self);

        Box::pin(async_stream::try_stream! {
            let user = Content::user(&message);
            let mut contents = session.history();
            contents.push(user.clone());

            let request = GenerateContentRequest {
                system_instruction: &session.system_instruction,
                contents: &contents,
                tools: &session.tools,
            };

            let response = session
                .client
                .post(&session.endpoint)
                .header("x-goog-api-key", &session.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "chat request failed");
                    Error::from(e)
                })?;

            let status = response.status();
            tracing::debug!(status = %status, "received response");

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(status = %status, body = %body, "chat API error");
                Err::<(), _>(Error::Chat(format!("chat API error {status}: {body}")))?;
                return;
            }

            let mut decoder = SseDecoder::new();
            let mut reply = String::new();
            let mut bytes = response.bytes_stream();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(Error::from)?;
                for data in decoder.feed(&chunk) {
                    if let Some(fragment) = parse_fragment(&data)? {
                        reply.push_str(&fragment);
                        yield fragment;
                    }
                }
            }
            if let Some(data) = decoder.finish() {
                if let Some(fragment) = parse_fragment(&data)? {
                    reply.push_str(&fragment);
                    yield fragment;
                }
            }

            tracing::debug!(reply_len = reply.len(), "chat reply complete");
            session
                .history
                .lock()
                .extend([user, Content::model(&reply)]);
        })
    }
}

/// Decode one event payload into a fragment
fn parse_fragment(data: &str) -> Result<Option<String>> {
    let response: GenerateContentResponse = serde_json::from_str(data)?;

    if let Some(err) = response.error {
        let status = err.status.unwrap_or_default();
        return Err(Error::Chat(format!(
            "chat API error {} {status}: {}",
            err.code, err.message
        )));
    }

    Ok(response.text())
}

/// Chat front-end: holds the session and publishes readiness
#[derive(Debug)]
pub struct ChatClient {
    session: Option<Arc<ChatSession>>,
}

impl ChatClient {
    /// Create the client, opening a session if the API key is configured
    ///
    /// A missing key is not an error: chat stays unavailable, `ready` stays
    /// false and a warning is logged.
    #[must_use]
    pub fn new(config: &Config, system_prompt: &str, state: &AssistantState) -> Self {
        let session = match config.api_keys.gemini.clone() {
            Some(key) => match ChatSession::new(&config.chat, key, system_prompt) {
                Ok(session) => Some(Arc::new(session)),
                Err(e) => {
                    tracing::warn!(error = %e, "chat disabled");
                    None
                }
            },
            None => {
                tracing::warn!("GEMINI_API_KEY not set, chat disabled");
                None
            }
        };

        state.set_ready(session.is_some());
        Self { session }
    }

    /// Client with no session; every `send` fails
    #[must_use]
    pub const fn disabled() -> Self {
        Self { session: None }
    }

    /// Whether a session exists
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    /// The underlying session, if initialized
    #[must_use]
    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_deref()
    }

    /// Send a message and stream the reply fragments
    ///
    /// Transport faults are yielded by the stream unchanged; there is no
    /// retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if no session was created
    pub fn send(&self, message: &str) -> Result<FragmentStream> {
        let session = self.session.as_ref().ok_or(Error::NotInitialized)?;
        tracing::debug!(message, "sending chat message");
        Ok(session.stream(message.to_string()))
    }
}
