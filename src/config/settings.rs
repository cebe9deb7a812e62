//! Application settings structs, defaults and TOML persistence.
//!
//! These are the operator-level knobs (endpoints, models, audio rates).  The
//! learner's own choices (level, topic, voice) are conversation state and live
//! in the key-value store instead; see [`crate::conversation::UserSettings`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// GeminiConfig
// ---------------------------------------------------------------------------

/// Connection and sampling settings for the Gemini REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Base URL up to and including the API version segment.
    pub base_url: String,
    /// Model used for tutor replies.
    pub chat_model: String,
    /// Model used for speech synthesis.
    pub tts_model: String,
    /// Model used for the credential validation probe.
    pub probe_model: String,
    /// Sampling temperature for tutor replies.
    pub temperature: f32,
    /// Nucleus sampling threshold for tutor replies.
    pub top_p: f32,
    /// Maximum seconds to wait for any single API call.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            chat_model: "gemini-2.0-flash".into(),
            tts_model: "gemini-2.5-flash-preview-tts".into(),
            probe_model: "gemini-2.0-flash".into(),
            temperature: 0.7,
            top_p: 0.95,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for synthesized-speech playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate of the synthesized PCM payload in Hz.
    pub sample_rate: u32,
    /// Playback-rate multiplier used by "slow replay".
    pub slow_rate: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            slow_rate: 0.75,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper-backed speech recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// GGML model name / file stem inside the models directory.
    pub model: String,
    /// Attempt GPU-accelerated inference when available.
    pub use_gpu: bool,
    /// RMS threshold above which a 30 ms frame counts as speech.
    pub vad_threshold: f32,
    /// Trailing silence (ms) after speech that ends the utterance.
    pub silence_ms: u32,
    /// Hard cap on a single utterance in seconds.
    pub max_utterance_secs: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "ggml-base".into(),
            use_gpu: false,
            vad_threshold: 0.01,
            silence_ms: 800,
            max_utterance_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Terminal front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Print the Korean translation block of tutor replies.
    pub show_translation: bool,
    /// Print interim recognition text while listening.
    pub show_interim: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_translation: true,
            show_interim: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use ai_teacher::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// assert_eq!(config.audio.sample_rate, 24_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gemini API settings.
    pub gemini: GeminiConfig,
    /// Playback settings.
    pub audio: AudioConfig,
    /// Speech recognition settings.
    pub stt: SttConfig,
    /// Front-end settings.
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.gemini.base_url, loaded.gemini.base_url);
        assert_eq!(original.gemini.chat_model, loaded.gemini.chat_model);
        assert_eq!(original.gemini.tts_model, loaded.gemini.tts_model);
        assert_eq!(original.gemini.temperature, loaded.gemini.temperature);
        assert_eq!(original.gemini.top_p, loaded.gemini.top_p);
        assert_eq!(original.audio.sample_rate, loaded.audio.sample_rate);
        assert_eq!(original.audio.slow_rate, loaded.audio.slow_rate);
        assert_eq!(original.stt.model, loaded.stt.model);
        assert_eq!(original.stt.silence_ms, loaded.stt.silence_ms);
        assert_eq!(original.ui.show_translation, loaded.ui.show_translation);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.gemini.chat_model, "gemini-2.0-flash");
        assert_eq!(config.audio.sample_rate, 24_000);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(
            cfg.gemini.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(cfg.gemini.tts_model, "gemini-2.5-flash-preview-tts");
        assert!((cfg.gemini.temperature - 0.7).abs() < f32::EPSILON);
        assert!((cfg.gemini.top_p - 0.95).abs() < f32::EPSILON);
        assert!((cfg.audio.slow_rate - 0.75).abs() < f32::EPSILON);
        assert_eq!(cfg.stt.silence_ms, 800);
        assert_eq!(cfg.stt.max_utterance_secs, 30);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.gemini.base_url = "http://localhost:8080/v1beta".into();
        cfg.gemini.timeout_secs = 5;
        cfg.audio.slow_rate = 0.5;
        cfg.stt.model = "ggml-small".into();
        cfg.ui.show_translation = false;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.gemini.base_url, "http://localhost:8080/v1beta");
        assert_eq!(loaded.gemini.timeout_secs, 5);
        assert!((loaded.audio.slow_rate - 0.5).abs() < f32::EPSILON);
        assert_eq!(loaded.stt.model, "ggml-small");
        assert!(!loaded.ui.show_translation);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "gemini = 12").unwrap();

        assert!(AppConfig::load_from(&path).is_err());
    }
}
