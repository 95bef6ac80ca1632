pub mod providers;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// TTS provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TtsProvider {
    /// Microsoft Edge neural voices through the `edge-tts` command
    EdgeTts,
    OpenAI,
}

/// Relative speaking rate in percent, written as `+0%`, `-20%`, `+15%`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpeechRate(i16);

const RATE_PATTERN: &str = r"^[+-]\d{1,3}%$";

impl SpeechRate {
    pub fn new(percent: i16) -> Self {
        Self(percent)
    }

    pub fn percent(&self) -> i16 {
        self.0
    }

    /// Speed multiplier for engines that take a factor instead of a percentage
    pub fn as_factor(&self) -> f32 {
        1.0 + self.0 as f32 / 100.0
    }
}

impl FromStr for SpeechRate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let pattern = Regex::new(RATE_PATTERN)?;
        if !pattern.is_match(s) {
            return Err(anyhow!("Invalid speech rate '{}', expected a form like +0% or -20%", s));
        }

        let percent: i16 = s.trim_end_matches('%').parse()?;
        Ok(Self(percent))
    }
}

impl fmt::Display for SpeechRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}%", self.0)
    }
}

impl TryFrom<String> for SpeechRate {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SpeechRate> for String {
    fn from(rate: SpeechRate) -> Self {
        rate.to_string()
    }
}

/// Voice and rate handed to every synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    pub voice: String,
    pub rate: SpeechRate,
}

impl VoiceSettings {
    pub fn new(voice: impl Into<String>, rate: SpeechRate) -> Self {
        Self {
            voice: voice.into(),
            rate,
        }
    }
}

/// TTS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub voice: String,
    pub rate: SpeechRate,
    /// Executable used by the Edge provider
    pub command: String,
    /// API base URL (OpenAI-compatible providers)
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::EdgeTts,
            voice: "ja-JP-NanamiNeural".to_string(),
            rate: SpeechRate::default(),
            command: "edge-tts".to_string(),
            endpoint: Some("https://api.openai.com/v1".to_string()),
            api_key: None,
            model: "tts-1".to_string(),
            timeout_seconds: 60,
        }
    }
}

impl TtsConfig {
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings::new(self.voice.clone(), self.rate)
    }
}

/// Trait for speech synthesis engines
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` into an audio file at `output`
    async fn synthesize(&self, text: &str, voice: &VoiceSettings, output: &Path) -> Result<()>;

    fn provider_type(&self) -> TtsProvider;

    /// Extension of the files this engine writes
    fn output_extension(&self) -> &'static str {
        "mp3"
    }
}

/// Create a synthesizer based on configuration
pub fn create_synthesizer(config: &TtsConfig) -> Result<Box<dyn SpeechSynthesizer>> {
    match config.provider {
        TtsProvider::EdgeTts => Ok(Box::new(providers::EdgeTtsProvider::new(config.clone()))),
        TtsProvider::OpenAI => Ok(Box::new(providers::OpenAITtsProvider::new(config.clone())?)),
    }
}
