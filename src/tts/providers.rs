use super::{SpeechSynthesizer, TtsConfig, TtsProvider, VoiceSettings};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Edge TTS provider implementation
pub struct EdgeTtsProvider {
    config: TtsConfig,
}

impl EdgeTtsProvider {
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsProvider {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings, output: &Path) -> Result<()> {
        debug!("Running {} for voice {} at {}", self.config.command, voice.voice, voice.rate);

        // Values are glued to their flags: "-20%" or a line starting with "-"
        // would otherwise parse as an option
        let output_result = tokio::process::Command::new(&self.config.command)
            .arg(format!("--voice={}", voice.voice))
            .arg(format!("--rate={}", voice.rate))
            .arg(format!("--text={}", text))
            .arg("--write-media")
            .arg(output)
            .output()
            .await
            .with_context(|| format!("Failed to launch {}", self.config.command))?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(anyhow!(
                "{} failed ({}): {}",
                self.config.command,
                output_result.status,
                stderr.trim()
            ));
        }

        Ok(())
    }

    fn provider_type(&self) -> TtsProvider {
        TtsProvider::EdgeTts
    }
}

/// OpenAI speech endpoint provider implementation
pub struct OpenAITtsProvider {
    config: TtsConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenAISpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

impl OpenAITtsProvider {
    pub fn new(config: TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAITtsProvider {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings, output: &Path) -> Result<()> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key not configured"))?;

        let base = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');
        let url = format!("{}/audio/speech", base);

        let request = OpenAISpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &voice.voice,
            speed: voice.rate.as_factor().clamp(0.25, 4.0),
            response_format: "mp3",
        };

        debug!("Sending speech request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI TTS API error {}: {}", status, text));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(output, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;

        Ok(())
    }

    fn provider_type(&self) -> TtsProvider {
        TtsProvider::OpenAI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::SpeechRate;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_edge_missing_binary_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = TtsConfig {
            command: "definitely-not-an-installed-tts-binary".to_string(),
            ..TtsConfig::default()
        };

        let tts = EdgeTtsProvider::new(config);
        let voice = VoiceSettings::new("ja-JP-NanamiNeural", SpeechRate::default());
        let result = tts
            .synthesize("こんにちは", &voice, &temp_dir.path().join("out.mp3"))
            .await;

        assert!(result.is_err());
    }

    /// A stand-in for `edge-tts` that, like argparse, refuses an option value
    /// starting with `-` and writes the received text as the media file
    #[cfg(unix)]
    fn fake_edge_tts(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --voice|--rate|--text|--write-media)
      case "$2" in -*) echo "error: argument $1: expected one argument" >&2; exit 2 ;; esac
      [ "$1" = "--write-media" ] && media="$2"
      [ "$1" = "--text" ] && text="$2"
      shift 2 ;;
    --text=*) text="${1#--text=}"; shift ;;
    *) shift ;;
  esac
done
printf '%s' "$text" > "$media"
"#;
        let path = dir.join("fake-edge-tts");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_edge_text_starting_with_dash() {
        let temp_dir = TempDir::new().unwrap();
        let config = TtsConfig {
            command: fake_edge_tts(temp_dir.path()),
            ..TtsConfig::default()
        };

        let tts = EdgeTtsProvider::new(config);
        let voice = VoiceSettings::new("ja-JP-NanamiNeural", "-20%".parse().unwrap());

        for (i, text) in ["plain text", "-5度の朝", "- 最初の項目"].iter().enumerate() {
            let output = temp_dir.path().join(format!("line_{}.mp3", i));
            tts.synthesize(text, &voice, &output).await.unwrap();
            assert_eq!(std::fs::read_to_string(&output).unwrap(), *text);
        }
    }

    #[tokio::test]
    async fn test_openai_requires_api_key() {
        let temp_dir = TempDir::new().unwrap();
        let config = TtsConfig {
            provider: TtsProvider::OpenAI,
            api_key: None,
            ..TtsConfig::default()
        };

        let tts = OpenAITtsProvider::new(config).unwrap();
        let voice = VoiceSettings::new("alloy", SpeechRate::default());
        let err = tts
            .synthesize("hello", &voice, &temp_dir.path().join("out.mp3"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("API key"));
    }
}
