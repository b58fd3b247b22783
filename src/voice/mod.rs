//! Voice processing module
//!
//! Recognition and synthesis are modelled as capabilities
//! ([`RecognitionEngine`], [`SynthesisEngine`]) driven by thin control
//! layers ([`Recognizer`], [`SpeechQueue`]). The cloud-backed engines live
//! alongside the audio plumbing they use.

mod capture;
mod microphone;
mod playback;
pub mod recognition;
mod segmenter;
mod sentences;
mod speaker;
mod stt;
pub mod synthesis;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, rms, samples_to_wav};
pub use microphone::{MicrophoneRecognizer, NO_SPEECH};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, PlaybackOutcome, decode_mp3};
pub use recognition::{
    RecognitionEngine, RecognitionEvent, RecognitionEvents, RecognitionPhase, Recognizer,
    SessionId,
};
pub use segmenter::{SegmentState, SpeechSegmenter};
pub use sentences::SentenceChunker;
pub use speaker::{CloudSynthesizer, INTERRUPTED};
pub use stt::SpeechToText;
pub use synthesis::{
    SpeechQueue, SynthesisEngine, SynthesisEvent, SynthesisEvents, Utterance, UtteranceId,
};
pub use tts::TextToSpeech;
