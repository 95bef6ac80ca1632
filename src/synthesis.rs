use crate::audio::{remove_quietly, AudioCodec, AudioTrack};
use crate::config::Config;
use crate::tts::{SpeechSynthesizer, VoiceSettings};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One line of narration placed on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start time in seconds from the beginning of the track
    pub offset: f64,
    pub text: String,
}

impl Cue {
    pub fn new(offset: f64, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }

    /// Offset in whole milliseconds; float casts saturate at `u64::MAX`
    pub fn position_ms(&self) -> u64 {
        (self.offset * 1000.0).round() as u64
    }
}

/// Everything one narration render needs
#[derive(Debug, Clone)]
pub struct NarrationJob {
    pub voice: VoiceSettings,
    pub cues: Vec<Cue>,
    pub total_duration_ms: u64,
    pub sample_rate: u32,
    pub output: PathBuf,
    /// Holds per-cue files while the job runs
    pub work_dir: PathBuf,
}

impl NarrationJob {
    pub fn from_config(config: &Config) -> Self {
        let narration = &config.narration;
        Self {
            voice: config.tts.voice_settings(),
            cues: narration.cues.clone(),
            total_duration_ms: narration.total_duration_ms,
            sample_rate: narration.sample_rate,
            output: narration.output.clone(),
            work_dir: narration.work_dir.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be greater than 0");
        }
        validate_cues(&self.cues)
    }
}

pub(crate) fn validate_cues(cues: &[Cue]) -> Result<()> {
    for (i, cue) in cues.iter().enumerate() {
        if !cue.offset.is_finite() || cue.offset < 0.0 {
            bail!("Cue {} has invalid offset {}", i + 1, cue.offset);
        }
        if cue.text.trim().is_empty() {
            bail!("Cue {} has empty text", i + 1);
        }
    }
    Ok(())
}

/// Where one cue landed in the final mix
#[derive(Debug, Clone, PartialEq)]
pub struct CuePlacement {
    pub index: usize,
    pub position_ms: u64,
    pub clip_ms: u64,
    pub truncated_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NarrationReport {
    pub output: PathBuf,
    pub duration_ms: u64,
    pub placements: Vec<CuePlacement>,
}

impl NarrationReport {
    pub fn truncated_cues(&self) -> impl Iterator<Item = &CuePlacement> {
        self.placements.iter().filter(|p| p.truncated_ms > 0)
    }
}

/// Render every cue and mix them onto a silent track of the configured length.
///
/// The output always lasts exactly `total_duration_ms`. Per-cue files live in
/// `work_dir` and are removed whether or not the render succeeds.
pub async fn synthesize_narration(
    job: &NarrationJob,
    tts: &dyn SpeechSynthesizer,
    codec: &dyn AudioCodec,
) -> Result<NarrationReport> {
    job.validate()?;

    info!(
        "🎙️ Generating narration: {} cues, {:.1}s total",
        job.cues.len(),
        job.total_duration_ms as f64 / 1000.0
    );

    tokio::fs::create_dir_all(&job.work_dir)
        .await
        .with_context(|| format!("Failed to create {}", job.work_dir.display()))?;

    let mut segments = Vec::with_capacity(job.cues.len());
    let result = render(job, tts, codec, &mut segments).await;

    for segment in &segments {
        remove_quietly(segment).await;
    }
    // remove_dir refuses a non-empty directory, so unrelated files survive
    if let Err(e) = tokio::fs::remove_dir(&job.work_dir).await {
        warn!("Could not remove {}: {}", job.work_dir.display(), e);
    }

    result
}

async fn render(
    job: &NarrationJob,
    tts: &dyn SpeechSynthesizer,
    codec: &dyn AudioCodec,
    segments: &mut Vec<PathBuf>,
) -> Result<NarrationReport> {
    let mut track = AudioTrack::silent(job.total_duration_ms, job.sample_rate);
    let mut placements = Vec::with_capacity(job.cues.len());

    for (i, cue) in job.cues.iter().enumerate() {
        let segment = segment_path(&job.work_dir, i, tts.output_extension());
        segments.push(segment.clone());

        info!("  [{}/{}] {:.2}s: {}", i + 1, job.cues.len(), cue.offset, cue.text);
        tts.synthesize(&cue.text, &job.voice, &segment).await?;

        let clip = codec.decode(&segment, job.sample_rate).await?;
        let position_ms = cue.position_ms();
        let report = track.overlay(&clip, position_ms)?;

        if report.truncated_ms > 0 {
            warn!(
                "⚠️  Cue {} at {:.2}s runs past the end, {}ms cut off",
                i + 1,
                cue.offset,
                report.truncated_ms
            );
        }
        debug!("Cue {} mixed at {}ms ({}ms long)", i + 1, position_ms, clip.duration_ms());

        placements.push(CuePlacement {
            index: i + 1,
            position_ms,
            clip_ms: clip.duration_ms(),
            truncated_ms: report.truncated_ms,
        });
    }

    if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    codec.encode(&track, &job.output).await?;

    info!("✅ Narration saved: {} ({:.1}s)", job.output.display(), track.duration_secs());

    Ok(NarrationReport {
        output: job.output.clone(),
        duration_ms: track.duration_ms(),
        placements,
    })
}

fn segment_path(work_dir: &Path, index: usize, extension: &str) -> PathBuf {
    work_dir.join(format!("segment_{:02}.{}", index, extension))
}
