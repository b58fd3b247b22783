//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use papo::Config;
use papo::config::file::PapoConfigFile;
use papo::voice::{
    RecognitionEngine, RecognitionEvents, SynthesisEngine, SynthesisEvent, SynthesisEvents,
    Utterance,
};
use parking_lot::Mutex;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

/// Synthesis engine that records utterances and lets the test drive events
pub struct MockSynthesizer {
    supported: bool,
    busy: AtomicBool,
    spoken: Mutex<Vec<(Utterance, SynthesisEvents)>>,
    cancels: AtomicUsize,
}

impl MockSynthesizer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_support(true))
    }

    #[must_use]
    pub fn unsupported() -> Arc<Self> {
        Arc::new(Self::with_support(false))
    }

    fn with_support(supported: bool) -> Self {
        Self {
            supported,
            busy: AtomicBool::new(false),
            spoken: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    /// Texts handed to the engine, in order
    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|(u, _)| u.text.clone()).collect()
    }

    pub fn spoken_count(&self) -> usize {
        self.spoken.lock().len()
    }

    pub fn last_utterance(&self) -> Utterance {
        self.spoken.lock().last().expect("nothing spoken").0.clone()
    }

    /// Events sink of the most recent utterance
    pub fn last_events(&self) -> SynthesisEvents {
        self.spoken.lock().last().expect("nothing spoken").1.clone()
    }

    /// Report the most recent utterance as started
    pub fn start_last(&self) {
        let events = self.last_events();
        events.emit(SynthesisEvent::Start);
    }

    /// Report the most recent utterance as finished
    pub fn finish_last(&self) {
        let events = self.last_events();
        events.emit(SynthesisEvent::End);
    }

    /// Report the most recent utterance as failed
    pub fn fail_last(&self, message: &str) {
        let events = self.last_events();
        events.emit(SynthesisEvent::Error(message.to_string()));
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl SynthesisEngine for MockSynthesizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn is_speaking(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn speak(&self, utterance: Utterance, events: SynthesisEvents) {
        self.spoken.lock().push((utterance, events));
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recognition engine that records sessions and lets the test drive events
pub struct MockRecognizer {
    supported: bool,
    fail_start: bool,
    sessions: Mutex<Vec<RecognitionEvents>>,
    /// Sessions registered when each stop arrived
    stops: Mutex<Vec<usize>>,
    before_start: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl MockRecognizer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(true, false))
    }

    #[must_use]
    pub fn unsupported() -> Arc<Self> {
        Arc::new(Self::build(false, false))
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self::build(true, true))
    }

    fn build(supported: bool, fail_start: bool) -> Self {
        Self {
            supported,
            fail_start,
            sessions: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            before_start: Mutex::new(None),
        }
    }

    /// Run `hook` inside the next `start`, before the session is registered
    pub fn before_next_start(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_start.lock() = Some(Box::new(hook));
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Events sink of the most recent session
    pub fn last_session(&self) -> RecognitionEvents {
        self.sessions.lock().last().expect("no session").clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.lock().len()
    }

    /// Stops that arrived once a session was registered
    pub fn effective_stops(&self) -> usize {
        self.stops.lock().iter().filter(|&&n| n > 0).count()
    }
}

impl RecognitionEngine for MockRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&self, events: RecognitionEvents) -> papo::Result<()> {
        if self.fail_start {
            return Err(papo::Error::Audio("no input device available".to_string()));
        }
        let hook = self.before_start.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.sessions.lock().push(events);
        Ok(())
    }

    fn stop(&self) {
        let registered = self.sessions.lock().len();
        self.stops.lock().push(registered);
    }
}

/// Counts events logged at ERROR level
#[derive(Clone, Default)]
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` and return how many errors it logged
pub fn count_errors<R>(f: impl FnOnce() -> R) -> (R, usize) {
    let counter = ErrorCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, counter.0.load(Ordering::SeqCst))
}

/// Build a config from env-style pairs, ignoring the real environment
pub fn config_with(pairs: &[(&str, &str)]) -> Config {
    let pairs: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_sources(PapoConfigFile::default(), move |key| {
        pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
}

/// A request the mock chat server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub api_key: Option<String>,
    pub body: serde_json::Value,
}

struct ServerState {
    status: StatusCode,
    body: String,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Handle to a local chat server replying with a canned SSE body
pub struct MockChatServer {
    pub base_url: String,
    state: Arc<ServerState>,
}

impl MockChatServer {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }
}

async fn handle_chat(
    State(state): State<Arc<ServerState>>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.requests.lock().push(RecordedRequest {
        path: uri.path().to_string(),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        body,
    });

    (
        state.status,
        [(header::CONTENT_TYPE, "text/event-stream")],
        state.body.clone(),
    )
}

/// Start a chat server on an ephemeral port
pub async fn spawn_chat_server(status: StatusCode, body: String) -> MockChatServer {
    let state = Arc::new(ServerState {
        status,
        body,
        requests: Mutex::new(Vec::new()),
    });

    let app = axum::Router::new()
        .fallback(handle_chat)
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock server");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    MockChatServer {
        base_url: format!("http://{addr}"),
        state,
    }
}

/// SSE body with one event per fragment
#[must_use]
pub fn sse_body(fragments: &[&str]) -> String {
    fragments
        .iter()
        .map(|text| {
            let event = serde_json::json!({
                "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
            });
            format!("data: {event}\r\n\r\n")
        })
        .collect()
}
