use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub wake_word: WakeWordConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device name; `None` selects the system default.
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Seconds of audio captured per utterance before auto-stop.
    pub recording_duration_secs: f32,
    /// Restart recording automatically after each completed utterance.
    pub continuous: bool,
}

/// Transcription configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Spoken language, selecting the seeded language token.
    pub language: Language,
    /// Translate to English instead of transcribing in the spoken language.
    pub translate_to_english: bool,
    /// Seed the decoder for timestamped output.
    pub include_timestamps: bool,
    /// Token budget per utterance, seed tokens included.
    pub max_tokens: usize,
}

/// Supported spoken languages.
///
/// Each maps to a fixed language token id of the bundled model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    German,
    French,
}

impl Language {
    /// The model's language token id.
    pub fn token_id(self) -> i32 {
        match self {
            Language::English => defaults::TOKEN_ENGLISH,
            Language::German => defaults::TOKEN_GERMAN,
            Language::French => defaults::TOKEN_FRENCH,
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "de" | "german" => Ok(Language::German),
            "fr" | "french" => Ok(Language::French),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// Wake-word detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WakeWordConfig {
    /// Samples per frame fed to the mel network.
    pub frame_size: usize,
    /// Hop between successive frames, in samples.
    pub hop_size: usize,
    /// Classifier score threshold.
    pub threshold: f32,
    /// Consecutive above-threshold scores required to fire.
    pub patience_frames: usize,
    /// Cooldown after a detection, in seconds.
    pub debounce_secs: f32,
    /// Mel window length required by the embedding network.
    pub required_mel_frames: usize,
    /// Embedding window length required by the classifier network.
    pub required_embed_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            recording_duration_secs: defaults::RECORDING_DURATION_SECS,
            continuous: false,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language: Language::English,
            translate_to_english: false,
            include_timestamps: false,
            max_tokens: defaults::MAX_TOKENS,
        }
    }
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            frame_size: defaults::wake::FRAME_SIZE,
            hop_size: defaults::wake::HOP_SIZE,
            threshold: defaults::wake::THRESHOLD,
            patience_frames: defaults::wake::PATIENCE_FRAMES,
            debounce_secs: defaults::wake::DEBOUNCE_SECS,
            required_mel_frames: defaults::wake::REQUIRED_MEL_FRAMES,
            required_embed_frames: defaults::wake::REQUIRED_EMBED_FRAMES,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SOTTO_LANGUAGE → transcription.language
    /// - SOTTO_AUDIO_DEVICE → audio.device
    /// - SOTTO_CONTINUOUS → audio.continuous ("1"/"true")
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("SOTTO_LANGUAGE")
            && let Ok(parsed) = language.parse()
        {
            self.transcription.language = parsed;
        }

        if let Ok(device) = std::env::var("SOTTO_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(continuous) = std::env::var("SOTTO_CONTINUOUS") {
            self.audio.continuous = continuous == "1" || continuous.eq_ignore_ascii_case("true");
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/sotto/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sotto").join("config.toml"))
    }

    /// The accumulator capacity bound implied by this configuration.
    pub fn accumulator_capacity(&self) -> usize {
        (self.audio.recording_duration_secs * self.audio.sample_rate as f32) as usize
            * defaults::ACCUMULATOR_SAFETY_FACTOR
    }
}
