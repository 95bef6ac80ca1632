use crate::synthesis::{validate_cues, Cue};
use crate::tts::{TtsConfig, TtsProvider};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use yt_upload::RetryPolicy;

/// Configuration for narration-kit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Speech engine settings
    pub tts: TtsConfig,

    /// Narration track settings
    pub narration: NarrationConfig,

    /// Duration measurement settings
    pub measure: MeasureConfig,

    /// YouTube upload settings
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Length of the output track in milliseconds
    pub total_duration_ms: u64,

    /// Sample rate of the mix
    pub sample_rate: u32,

    /// Output audio file
    pub output: PathBuf,

    /// Scratch directory for per-cue audio
    pub work_dir: PathBuf,

    /// Bitrate for lossy output
    pub bitrate: String,

    /// Timed narration lines
    pub cues: Vec<Cue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Lines to measure when none are given on the command line
    pub texts: Vec<String>,

    /// Animation time per section for the wait plan
    pub animation_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes per resumable chunk, rounded up to 256 KiB
    pub chunk_size: usize,

    /// Attempts per request, including the first
    pub max_attempts: u32,

    /// First retry delay in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound on the retry delay in milliseconds
    pub max_delay_ms: u64,

    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            total_duration_ms: 120_000,
            sample_rate: 24_000,
            output: PathBuf::from("narration.mp3"),
            work_dir: PathBuf::from("audio_segments"),
            bitrate: "128k".to_string(),
            cues: Vec::new(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 64_000,
            timeout_seconds: 300,
        }
    }
}

impl UploadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

const CONFIG_FILE_NAME: &str = "narration-kit.toml";

impl Config {
    /// Locations searched when no explicit path is given, in order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            Path::new("config").join(CONFIG_FILE_NAME),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/narration-kit/config.toml"));
        }
        paths
    }

    /// Load configuration from `explicit`, the search path, or the environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let mut config = Self::from_file(path)?;
            config.apply_env();
            return Ok(config);
        }

        for path in Self::search_paths() {
            if !path.is_file() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(mut config) => {
                    config.apply_env();
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {:#}", path.display(), e);
                }
            }
        }

        Self::from_env()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(voice) = std::env::var("NARRATION_VOICE") {
            self.tts.voice = voice;
        }

        if let Ok(rate) = std::env::var("NARRATION_RATE") {
            match rate.parse() {
                Ok(rate) => self.tts.rate = rate,
                Err(e) => tracing::warn!("Ignoring NARRATION_RATE: {}", e),
            }
        }

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            if self.tts.api_key.is_none() {
                self.tts.api_key = Some(api_key);
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tts.voice.trim().is_empty() {
            return Err(anyhow!("tts.voice must not be empty"));
        }

        if self.tts.provider == TtsProvider::OpenAI && self.tts.api_key.is_none() {
            return Err(anyhow!("API key required for the OpenAI TTS provider"));
        }

        if self.narration.sample_rate == 0 {
            return Err(anyhow!("narration.sample_rate must be greater than 0"));
        }

        if self.narration.bitrate.trim().is_empty() {
            return Err(anyhow!("narration.bitrate must not be empty"));
        }

        validate_cues(&self.narration.cues)?;

        if self.upload.chunk_size == 0 {
            return Err(anyhow!("upload.chunk_size must be greater than 0"));
        }

        if self.upload.max_attempts == 0 {
            return Err(anyhow!("upload.max_attempts must be greater than 0"));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "narration-kit configuration:\n\
            - TTS Provider: {:?}\n\
            - Voice: {} ({})\n\
            - Narration: {} cues, {}ms at {}Hz -> {}\n\
            - Measure Texts: {}\n\
            - Upload: {} KiB chunks, {} attempts",
            self.tts.provider,
            self.tts.voice,
            self.tts.rate,
            self.narration.cues.len(),
            self.narration.total_duration_ms,
            self.narration.sample_rate,
            self.narration.output.display(),
            self.measure.texts.len(),
            self.upload.chunk_size / 1024,
            self.upload.max_attempts
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_provider(mut self, provider: TtsProvider) -> Self {
        self.config.tts.provider = provider;
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.config.tts.voice = voice.into();
        self
    }

    pub fn with_rate(mut self, rate: crate::tts::SpeechRate) -> Self {
        self.config.tts.rate = rate;
        self
    }

    pub fn with_cues(mut self, cues: Vec<Cue>) -> Self {
        self.config.narration.cues = cues;
        self
    }

    pub fn with_total_duration_ms(mut self, duration_ms: u64) -> Self {
        self.config.narration.total_duration_ms = duration_ms;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.narration.sample_rate = sample_rate;
        self
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.config.narration.output = output;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.upload.chunk_size = chunk_size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::SpeechRate;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tts.voice, "ja-JP-NanamiNeural");
        assert_eq!(config.tts.rate, SpeechRate::new(0));
        assert_eq!(config.narration.total_duration_ms, 120_000);
        assert_eq!(config.narration.sample_rate, 24_000);
        assert_eq!(config.narration.output, PathBuf::from("narration.mp3"));
        assert_eq!(config.upload.chunk_size, 256 * 1024);
        assert_eq!(config.upload.max_attempts, 10);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_voice("en-US-AriaNeural")
            .with_rate(SpeechRate::new(-10))
            .with_total_duration_ms(30_000)
            .with_cues(vec![Cue::new(0.0, "hello")])
            .build();

        assert_eq!(config.tts.voice, "en-US-AriaNeural");
        assert_eq!(config.tts.rate.to_string(), "-10%");
        assert_eq!(config.narration.total_duration_ms, 30_000);
        assert_eq!(config.narration.cues.len(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let config = ConfigBuilder::new().with_sample_rate(0).build();
        assert!(config.validate().is_err());

        let mut config = ConfigBuilder::new().with_provider(TtsProvider::OpenAI).build();
        config.tts.api_key = None;
        assert!(config.validate().is_err());

        let config = ConfigBuilder::new().with_cues(vec![Cue::new(-2.0, "x")]).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [tts]
            rate = "-20%"

            [narration]
            total_duration_ms = 60000
            cues = [
                { offset = 0.0, text = "最初" },
                { offset = 5, text = "次" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.tts.voice, "ja-JP-NanamiNeural");
        assert_eq!(config.tts.rate.percent(), -20);
        assert_eq!(config.narration.total_duration_ms, 60_000);
        assert_eq!(config.narration.cues[1], Cue::new(5.0, "次"));
        assert_eq!(config.narration.sample_rate, 24_000);
    }

    #[test]
    fn test_bad_rate_is_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("[tts]\nrate = \"fast\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_explicit() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("narration-kit.toml");

        let config = ConfigBuilder::new()
            .with_cues(vec![Cue::new(1.25, "こんにちは")])
            .with_output(PathBuf::from("out/voice.wav"))
            .build();
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.narration.cues, config.narration.cues);
        assert_eq!(loaded.narration.output, PathBuf::from("out/voice.wav"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&temp_dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = UploadConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(20), Duration::from_secs(64));
    }
}
