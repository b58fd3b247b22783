//! Configuration management for Papo
//!
//! Values are layered: environment > TOML file > defaults.

pub mod file;

use file::PapoConfigFile;

/// Default chat model identifier
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// Default chat API base URL
pub const DEFAULT_CHAT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default locale for recognition and synthesis (Brazilian Portuguese)
pub const DEFAULT_LOCALE: &str = "pt-BR";

/// Default speech rate, relative to the engine's baseline
pub const DEFAULT_TTS_SPEED: f32 = 3.0;

/// Speed range accepted by the TTS API
const TTS_SPEED_RANGE: std::ops::RangeInclusive<f32> = 0.25..=4.0;

/// Papo configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat service configuration
    pub chat: ChatConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Chat service configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Model identifier for chat completions
    pub model: String,

    /// API base URL (overridable for proxies and tests)
    pub base_url: String,

    /// Attach the web search tool to every request
    pub web_search: bool,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Locale used for recognition and synthesis
    pub locale: String,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// Gemini API key (chat)
    pub gemini: Option<String>,

    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("gemini", &self.gemini.as_ref().map(|_| "<redacted>"))
            .field("openai", &self.openai.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment and the config file
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed config file and an env lookup
    ///
    /// Empty env values are treated as unset.
    #[must_use]
    pub fn from_sources<F>(fc: PapoConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_keys = ApiKeys {
            gemini: var("GEMINI_API_KEY").or(fc.api_keys.gemini),
            openai: var("OPENAI_API_KEY").or(fc.api_keys.openai),
        };

        let chat = ChatConfig {
            model: var("PAPO_CHAT_MODEL")
                .or(fc.chat.model)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            base_url: var("PAPO_CHAT_BASE_URL")
                .or(fc.chat.base_url)
                .unwrap_or_else(|| DEFAULT_CHAT_BASE_URL.to_string()),
            web_search: fc.chat.web_search.unwrap_or(true),
        };

        let finite = |s: &f32| s.is_finite();
        let tts_speed = var("PAPO_TTS_SPEED")
            .and_then(|s| s.parse().ok())
            .filter(finite)
            .or(fc.voice.tts_speed.filter(finite))
            .unwrap_or(DEFAULT_TTS_SPEED);

        let voice = VoiceConfig {
            locale: var("PAPO_LOCALE")
                .or(fc.voice.locale)
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            stt_model: var("PAPO_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: var("PAPO_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: var("PAPO_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "onyx".to_string()),
            tts_speed: clamp_speed(tts_speed),
        };

        Self {
            chat,
            voice,
            api_keys,
        }
    }
}

fn clamp_speed(speed: f32) -> f32 {
    if TTS_SPEED_RANGE.contains(&speed) {
        speed
    } else {
        let clamped = speed.clamp(*TTS_SPEED_RANGE.start(), *TTS_SPEED_RANGE.end());
        tracing::warn!(speed, clamped, "tts speed out of range");
        clamped
    }
}
