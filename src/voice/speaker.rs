//! Cloud text-to-speech engine: synthesize remotely, play locally

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::playback::{AudioPlayback, PlaybackOutcome};
use super::synthesis::{SynthesisEngine, SynthesisEvent, SynthesisEvents, Utterance};
use super::tts::TextToSpeech;
use crate::config::Config;
use crate::{Error, Result};

/// Reason reported when an utterance is cut short by `cancel`
pub const INTERRUPTED: &str = "interrupted";

/// [`SynthesisEngine`] backed by the `OpenAI` speech API and the default
/// output device
///
/// The speech API takes no language parameter; its voices infer the
/// language from the text. [`Utterance::locale`] is therefore only logged
/// here, and the reply language is pinned by the chat system prompt built
/// from the same locale.
pub struct CloudSynthesizer {
    tts: Option<Arc<TextToSpeech>>,
    runtime: Handle,
    busy: Arc<AtomicBool>,
    stop: Mutex<Option<Arc<AtomicBool>>>,
}

impl CloudSynthesizer {
    /// Build from config; without an `OpenAI` key the engine is unsupported
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime
    pub fn new(config: &Config) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("speech synthesis needs a runtime: {e}")))?;

        let tts = match config.api_keys.openai.clone() {
            Some(key) => match TextToSpeech::new_openai(
                key,
                config.voice.tts_voice.clone(),
                config.voice.tts_model.clone(),
            ) {
                Ok(tts) => Some(Arc::new(tts)),
                Err(e) => {
                    tracing::warn!(error = %e, "speech synthesis disabled");
                    None
                }
            },
            None => {
                tracing::warn!("OPENAI_API_KEY not set, speech synthesis disabled");
                None
            }
        };

        Ok(Self {
            tts,
            runtime,
            busy: Arc::new(AtomicBool::new(false)),
            stop: Mutex::new(None),
        })
    }
}

impl SynthesisEngine for CloudSynthesizer {
    fn is_supported(&self) -> bool {
        self.tts.is_some()
    }

    fn is_speaking(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn speak(&self, utterance: Utterance, events: SynthesisEvents) {
        let Some(tts) = self.tts.clone() else {
            events.emit(SynthesisEvent::Error("speech synthesis unsupported".to_string()));
            return;
        };

        let stop = Arc::new(AtomicBool::new(false));
        *self.stop.lock() = Some(Arc::clone(&stop));
        self.busy.store(true, Ordering::Release);

        let busy = Arc::clone(&self.busy);
        self.runtime.spawn(async move {
            events.emit(SynthesisEvent::Start);
            let outcome = play_utterance(&tts, &utterance, stop).await;

            // Idle before the terminal event so the queue can start the next one
            busy.store(false, Ordering::Release);
            events.emit(match outcome {
                Ok(PlaybackOutcome::Finished) => SynthesisEvent::End,
                Ok(PlaybackOutcome::Stopped) => SynthesisEvent::Error(INTERRUPTED.to_string()),
                Err(e) => SynthesisEvent::Error(e.to_string()),
            });
        });
    }

    fn cancel(&self) {
        if let Some(stop) = self.stop.lock().take() {
            stop.store(true, Ordering::Release);
        }
    }
}

async fn play_utterance(
    tts: &TextToSpeech,
    utterance: &Utterance,
    stop: Arc<AtomicBool>,
) -> Result<PlaybackOutcome> {
    tracing::debug!(
        utterance = utterance.id,
        locale = %utterance.locale,
        rate = utterance.rate,
        "synthesizing"
    );
    let audio = tts.synthesize(&utterance.text, utterance.rate).await?;

    if stop.load(Ordering::Acquire) {
        return Ok(PlaybackOutcome::Stopped);
    }

    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_mp3(&audio, &stop))
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
}
