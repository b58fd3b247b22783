//! Microphone recognition engine: capture, endpoint, transcribe

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::recognition::{RecognitionEngine, RecognitionEvent, RecognitionEvents};
use super::segmenter::{SegmentState, SpeechSegmenter};
use super::stt::SpeechToText;
use crate::config::Config;
use crate::{Error, Result};

/// How often captured audio is handed to the segmenter
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error reported when a session hears nothing
pub const NO_SPEECH: &str = "no-speech";

/// [`RecognitionEngine`] that listens on the default input device and
/// transcribes one phrase with Whisper
///
/// Sessions are non-continuous and only produce final results.
pub struct MicrophoneRecognizer {
    stt: Option<Arc<SpeechToText>>,
    runtime: Handle,
    stop: Mutex<Option<Arc<AtomicBool>>>,
}

impl MicrophoneRecognizer {
    /// Build from config; without an `OpenAI` key the engine is unsupported
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime
    pub fn new(config: &Config) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("speech recognition needs a runtime: {e}")))?;

        let stt = match config.api_keys.openai.clone() {
            Some(key) => match SpeechToText::new_whisper(
                key,
                config.voice.stt_model.clone(),
                &config.voice.locale,
            ) {
                Ok(stt) => Some(Arc::new(stt)),
                Err(e) => {
                    tracing::warn!(error = %e, "speech recognition disabled");
                    None
                }
            },
            None => {
                tracing::warn!("OPENAI_API_KEY not set, speech recognition disabled");
                None
            }
        };

        Ok(Self {
            stt,
            runtime,
            stop: Mutex::new(None),
        })
    }
}

impl RecognitionEngine for MicrophoneRecognizer {
    fn is_supported(&self) -> bool {
        self.stt.is_some()
    }

    fn start(&self, events: RecognitionEvents) -> Result<()> {
        let stt = self
            .stt
            .clone()
            .ok_or_else(|| Error::Stt("speech recognition unsupported".to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        *self.stop.lock() = Some(Arc::clone(&stop));
        let runtime = self.runtime.clone();

        // cpal streams are not Send, so the capture lives on its own thread
        std::thread::Builder::new()
            .name(format!("papo-listen-{}", events.session()))
            .spawn(move || run_session(&stt, &runtime, &stop, &events))?;

        Ok(())
    }

    fn stop(&self) {
        if let Some(stop) = self.stop.lock().take() {
            stop.store(true, Ordering::Release);
        }
    }
}

fn run_session(stt: &SpeechToText, runtime: &Handle, stop: &AtomicBool, events: &RecognitionEvents) {
    match capture_phrase(stop, events) {
        Ok(Some(samples)) => {
            let transcript = samples_to_wav(&samples, SAMPLE_RATE)
                .and_then(|wav| runtime.block_on(stt.transcribe(&wav)));
            match transcript {
                Ok(transcript) => events.emit(RecognitionEvent::Result {
                    transcript,
                    is_final: true,
                }),
                Err(e) => events.emit(RecognitionEvent::Error(e.to_string())),
            }
        }
        Ok(None) => {}
        Err(e) => events.emit(RecognitionEvent::Error(e.to_string())),
    }

    events.emit(RecognitionEvent::End);
}

/// Record until a phrase completes, the session is stopped, or nobody speaks
fn capture_phrase(stop: &AtomicBool, events: &RecognitionEvents) -> Result<Option<Vec<f32>>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    events.emit(RecognitionEvent::Start);

    let mut segmenter = SpeechSegmenter::new();
    let phrase = loop {
        std::thread::sleep(POLL_INTERVAL);

        if let Some(err) = capture.take_error() {
            capture.stop();
            return Err(Error::Audio(err));
        }
        if stop.load(Ordering::Acquire) {
            tracing::debug!(session = events.session(), "recognition stopped early");
            break segmenter.finish();
        }

        match segmenter.process(&capture.take_buffer()) {
            SegmentState::Complete => break Some(segmenter.take_buffer()),
            SegmentState::NoSpeech => {
                capture.stop();
                return Err(Error::Stt(NO_SPEECH.to_string()));
            }
            SegmentState::Waiting | SegmentState::Speaking => {}
        }
    };

    capture.stop();
    Ok(phrase)
}
