use crate::audio::{remove_quietly, AudioCodec};
use crate::synthesis::Cue;
use crate::tts::{SpeechSynthesizer, VoiceSettings};
use anyhow::{bail, Result};
use std::fmt::Write as _;
use tracing::{debug, info};

/// Spoken length of one narration line
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// 1-based position in the input
    pub index: usize,
    pub duration_secs: f64,
    pub text: String,
}

/// Synthesize each text once and record how long it takes to say
pub async fn measure_durations(
    texts: &[String],
    voice: &VoiceSettings,
    tts: &dyn SpeechSynthesizer,
    codec: &dyn AudioCodec,
    sample_rate: u32,
) -> Result<Vec<Measurement>> {
    if sample_rate == 0 {
        bail!("sample_rate must be greater than 0");
    }

    info!("📏 Measuring {} narration lines with {}", texts.len(), voice.voice);

    let temp_dir = tempfile::Builder::new().prefix("narration-measure").tempdir()?;
    let mut measurements = Vec::with_capacity(texts.len());

    for (i, text) in texts.iter().enumerate() {
        let path = temp_dir
            .path()
            .join(format!("measure_{:02}.{}", i, tts.output_extension()));

        tts.synthesize(text, voice, &path).await?;
        let clip = codec.decode(&path, sample_rate).await?;
        remove_quietly(&path).await;

        debug!("Line {} measured at {}ms", i + 1, clip.duration_ms());
        measurements.push(Measurement {
            index: i + 1,
            duration_secs: clip.duration_ms() as f64 / 1000.0,
            text: text.clone(),
        });
    }

    Ok(measurements)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Cues that play the measured lines back to back
pub fn cumulative_cues(measurements: &[Measurement]) -> Vec<Cue> {
    let mut elapsed = 0.0;
    measurements
        .iter()
        .map(|m| {
            let cue = Cue::new(round2(elapsed), m.text.clone());
            elapsed += m.duration_secs;
            cue
        })
        .collect()
}

pub fn total_secs(measurements: &[Measurement]) -> f64 {
    measurements.iter().map(|m| m.duration_secs).sum()
}

/// Text rendering of a measurement run
pub struct MeasurementReport<'a> {
    measurements: &'a [Measurement],
}

impl<'a> MeasurementReport<'a> {
    pub fn new(measurements: &'a [Measurement]) -> Self {
        Self { measurements }
    }

    pub fn table(&self) -> String {
        let mut out = String::new();
        for m in self.measurements {
            let _ = writeln!(out, "{:2}. [{:5.2}s] {}", m.index, m.duration_secs, m.text);
        }

        let total = total_secs(self.measurements);
        let _ = writeln!(out);
        let _ = writeln!(out, "Total duration: {:.2}s ({:.1} min)", total, total / 60.0);
        out
    }

    /// Lines that can be pasted into `[narration] cues = [ ... ]`
    pub fn cue_list(&self) -> String {
        let mut out = String::new();
        for cue in cumulative_cues(self.measurements) {
            let text = toml::Value::String(cue.text).to_string();
            let _ = writeln!(out, "    {{ offset = {:.2}, text = {} }},", cue.offset, text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::WavCodec;
    use crate::config::Config;
    use crate::synthesis::test_support::FakeSynthesizer;
    use crate::tts::SpeechRate;

    fn measured(durations: &[f64]) -> Vec<Measurement> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| Measurement {
                index: i + 1,
                duration_secs: *d,
                text: format!("line {}", i + 1),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_measure_durations_in_order() {
        let texts = vec!["abc".to_string(), "abcdefghij".to_string()];
        let voice = VoiceSettings::new("ja-JP-NanamiNeural", SpeechRate::default());

        let tts = FakeSynthesizer::new(8000);
        let measurements = measure_durations(&texts, &voice, &tts, &WavCodec, 8000)
            .await
            .unwrap();

        assert_eq!(measurements.len(), 2);
        assert_eq!(measurements[0].index, 1);
        assert!((measurements[0].duration_secs - 0.3).abs() < 1e-9);
        assert!((measurements[1].duration_secs - 1.0).abs() < 1e-9);
        assert_eq!(measurements[1].text, "abcdefghij");
    }

    #[test]
    fn test_cumulative_offsets() {
        let cues = cumulative_cues(&measured(&[3.456, 2.0, 1.111]));
        let offsets: Vec<f64> = cues.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0.0, 3.46, 5.46]);
    }

    #[test]
    fn test_table_format() {
        let table = MeasurementReport::new(&measured(&[3.456, 90.0])).table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], " 1. [ 3.46s] line 1");
        assert_eq!(lines[1], " 2. [90.00s] line 2");
        assert_eq!(lines[3], "Total duration: 93.46s (1.6 min)");
    }

    #[test]
    fn test_cue_list_loads_as_config() {
        let mut measurements = measured(&[1.5, 2.25]);
        measurements[1].text = "say \"hi\"\\now".to_string();

        let cue_list = MeasurementReport::new(&measurements).cue_list();
        assert!(cue_list.starts_with("    { offset = 0.00, text = \"line 1\" },"));

        let toml_src = format!("[narration]\ncues = [\n{}]\n", cue_list);
        let config: Config = toml::from_str(&toml_src).unwrap();
        assert_eq!(config.narration.cues, cumulative_cues(&measurements));
    }
}
