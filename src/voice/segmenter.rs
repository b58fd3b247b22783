//! Energy-based speech endpointing
//!
//! Decides when a spoken phrase is over: enough speech followed by enough
//! silence. Also gives up when nobody speaks for a while.

use super::capture::{SAMPLE_RATE, rms};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech for a phrase (0.3 seconds at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Silence that ends a phrase (0.8 seconds)
const SILENCE_SAMPLES: usize = 12_800;

/// Waiting this long without speech ends the session (8 seconds)
const NO_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 8;

/// Where the segmenter is within one phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// No speech heard yet
    Waiting,
    /// Speech in progress, accumulating
    Speaking,
    /// Speech followed by silence; the buffer holds the phrase
    Complete,
    /// Gave up waiting for speech
    NoSpeech,
}

/// Splits a sample stream into one spoken phrase
#[derive(Debug)]
pub struct SpeechSegmenter {
    state: SegmentState,
    buffer: Vec<f32>,
    silence_counter: usize,
    waited: usize,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmentState::Waiting,
            buffer: Vec::new(),
            silence_counter: 0,
            waited: 0,
        }
    }

    /// Feed a block of samples and return the resulting state
    ///
    /// Once `Complete` or `NoSpeech` is reached further input is ignored.
    pub fn process(&mut self, samples: &[f32]) -> SegmentState {
        if samples.is_empty() {
            return self.state;
        }

        let energy = rms(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmentState::Waiting => {
                if is_speech {
                    self.state = SegmentState::Speaking;
                    self.buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                } else {
                    self.waited += samples.len();
                    if self.waited > NO_SPEECH_SAMPLES {
                        tracing::debug!("no speech detected");
                        self.state = SegmentState::NoSpeech;
                    }
                }
            }
            SegmentState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                let voiced = self.buffer.len().saturating_sub(self.silence_counter);
                if self.silence_counter > SILENCE_SAMPLES {
                    if voiced > MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.buffer.len(), "speech segment complete");
                        self.state = SegmentState::Complete;
                    } else {
                        // A click or cough, not a phrase
                        tracing::trace!("speech too short - resetting");
                        self.waited += self.buffer.len();
                        self.buffer.clear();
                        self.silence_counter = 0;
                        self.state = SegmentState::Waiting;
                    }
                }
            }
            SegmentState::Complete | SegmentState::NoSpeech => {}
        }

        self.state
    }

    /// End the phrase early, returning it if it holds enough speech
    pub fn finish(&mut self) -> Option<Vec<f32>> {
        let voiced = self.buffer.len().saturating_sub(self.silence_counter);
        let samples = self.take_buffer();
        (voiced > MIN_SPEECH_SAMPLES).then_some(samples)
    }

    /// Take the accumulated phrase, clearing it
    pub fn take_buffer(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.buffer)
    }

    #[must_use]
    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    /// Reset to waiting for a new phrase
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(secs: f32) -> Vec<f32> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let n = (SAMPLE_RATE as f32 * secs) as usize;
        #[allow(clippy::cast_precision_loss)]
        let samples = (0..n)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        samples
    }

    fn silence(secs: f32) -> Vec<f32> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let n = (SAMPLE_RATE as f32 * secs) as usize;
        vec![0.0; n]
    }

    #[test]
    fn test_phrase_then_silence_completes() {
        let mut seg = SpeechSegmenter::new();
        assert_eq!(seg.process(&silence(0.2)), SegmentState::Waiting);
        assert_eq!(seg.process(&tone(0.6)), SegmentState::Speaking);
        assert_eq!(seg.process(&silence(1.0)), SegmentState::Complete);

        let phrase = seg.take_buffer();
        assert_eq!(phrase.len(), tone(0.6).len() + silence(1.0).len());
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut seg = SpeechSegmenter::new();
        seg.process(&tone(0.1));
        assert_eq!(seg.process(&silence(1.0)), SegmentState::Waiting);
        assert!(seg.buffer().is_empty());
    }

    #[test]
    fn test_no_speech_times_out() {
        let mut seg = SpeechSegmenter::new();
        let mut state = SegmentState::Waiting;
        for _ in 0..90 {
            state = seg.process(&silence(0.1));
        }
        assert_eq!(state, SegmentState::NoSpeech);
        assert_eq!(seg.process(&tone(1.0)), SegmentState::NoSpeech);
    }

    #[test]
    fn test_finish_early() {
        let mut seg = SpeechSegmenter::new();
        assert!(seg.finish().is_none());

        seg.process(&tone(0.5));
        assert_eq!(seg.finish().map(|s| s.len()), Some(tone(0.5).len()));
        assert!(seg.buffer().is_empty());
    }

    #[test]
    fn test_reset_after_timeout() {
        let mut seg = SpeechSegmenter::new();
        for _ in 0..90 {
            seg.process(&silence(0.1));
        }
        assert_eq!(seg.state(), SegmentState::NoSpeech);

        seg.reset();
        assert_eq!(seg.state(), SegmentState::Waiting);
        assert_eq!(seg.process(&tone(0.5)), SegmentState::Speaking);
    }
}
