use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, info, warn};

/// Mono 16-bit PCM held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    samples: Vec<i16>,
    sample_rate: u32,
}

/// What happened to a clip laid onto a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayReport {
    pub position_ms: u64,
    pub mixed_samples: usize,
    /// Clip audio that fell past the end of the track
    pub truncated_ms: u64,
}

impl AudioTrack {
    /// Silence lasting exactly `duration_ms`
    pub fn silent(duration_ms: u64, sample_rate: u32) -> Self {
        let len = duration_ms.saturating_mul(sample_rate as u64).div_ceil(1000);
        Self {
            samples: vec![0; usize::try_from(len).unwrap_or(usize::MAX)],
            sample_rate,
        }
    }

    pub fn from_samples(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }

    /// Saturates, so a far-off position lands past the end instead of wrapping
    fn ms_to_samples(&self, ms: u64) -> usize {
        let samples = ms.saturating_mul(self.sample_rate as u64) / 1000;
        usize::try_from(samples).unwrap_or(usize::MAX)
    }

    /// Mix `clip` into this track starting at `position_ms`.
    ///
    /// Samples are added with saturation so overlapping clips both stay audible.
    /// The track never grows; whatever runs past the end is dropped and reported.
    pub fn overlay(&mut self, clip: &AudioTrack, position_ms: u64) -> Result<OverlayReport> {
        if clip.sample_rate != self.sample_rate {
            bail!(
                "Cannot overlay {}Hz audio onto a {}Hz track",
                clip.sample_rate,
                self.sample_rate
            );
        }

        let start = self.ms_to_samples(position_ms).min(self.samples.len());
        let room = self.samples.len() - start;
        let mixed = clip.samples.len().min(room);

        for (dst, src) in self.samples[start..start + mixed].iter_mut().zip(&clip.samples) {
            *dst = dst.saturating_add(*src);
        }

        let dropped = clip.samples.len() - mixed;
        let truncated_ms = (dropped as u64 * 1000).div_ceil(self.sample_rate as u64);

        Ok(OverlayReport {
            position_ms,
            mixed_samples: mixed,
            truncated_ms,
        })
    }
}

/// Reads and writes audio files as [`AudioTrack`]s
#[async_trait]
pub trait AudioCodec: Send + Sync {
    /// Decode `path` into mono PCM at `sample_rate`
    async fn decode(&self, path: &Path, sample_rate: u32) -> Result<AudioTrack>;

    async fn encode(&self, track: &AudioTrack, path: &Path) -> Result<()>;
}

/// 16-bit WAV through hound, no external tools
#[derive(Debug, Clone, Copy, Default)]
pub struct WavCodec;

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

fn read_wav(path: &Path, sample_rate: u32) -> Result<AudioTrack> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV {}", path.display()))?;
    let spec = reader.spec();

    if spec.sample_rate != sample_rate {
        bail!(
            "{} is {}Hz, expected {}Hz",
            path.display(),
            spec.sample_rate,
            sample_rate
        );
    }

    let interleaved: Vec<i32> = match spec.sample_format {
        SampleFormat::Int => {
            let shift = spec.bits_per_sample as i32 - 16;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| match shift {
                        0 => v,
                        n if n > 0 => v >> n,
                        n => v << -n,
                    })
                })
                .collect::<std::result::Result<_, _>>()?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i32))
            .collect::<std::result::Result<_, _>>()?,
    };

    let channels = spec.channels.max(1) as usize;
    let samples = interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().sum();
            (sum / frame.len() as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect();

    Ok(AudioTrack::from_samples(samples, sample_rate))
}

fn write_wav(track: &AudioTrack, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: track.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for sample in &track.samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[async_trait]
impl AudioCodec for WavCodec {
    async fn decode(&self, path: &Path, sample_rate: u32) -> Result<AudioTrack> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_wav(&path, sample_rate)).await?
    }

    async fn encode(&self, track: &AudioTrack, path: &Path) -> Result<()> {
        let track = track.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_wav(&track, &path)).await?
    }
}

/// Any container ffmpeg understands, converted through a temporary WAV
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    pub binary: String,
    /// Target bitrate for lossy output, e.g. `128k`
    pub bitrate: String,
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self::new("128k")
    }
}

impl FfmpegCodec {
    pub fn new(bitrate: impl Into<String>) -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            bitrate: bitrate.into(),
        }
    }

    async fn run(&self, args: Vec<&OsStr>) -> Result<()> {
        let output = tokio::process::Command::new(&self.binary)
            .args(["-v", "error", "-y"])
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to launch {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} failed ({}): {}", self.binary, output.status, stderr.trim()));
        }
        Ok(())
    }

    /// A WAV whose header already matches can skip the ffmpeg round trip
    fn wav_matches(path: &Path, sample_rate: u32) -> bool {
        is_wav(path)
            && WavReader::open(path)
                .map(|r| r.spec().sample_rate == sample_rate)
                .unwrap_or(false)
    }
}

#[async_trait]
impl AudioCodec for FfmpegCodec {
    async fn decode(&self, path: &Path, sample_rate: u32) -> Result<AudioTrack> {
        if Self::wav_matches(path, sample_rate) {
            return WavCodec.decode(path, sample_rate).await;
        }

        let temp_dir = tempfile::Builder::new().prefix("narration-decode").tempdir()?;
        let wav_path = temp_dir.path().join("decoded.wav");
        let rate = sample_rate.to_string();

        debug!("Decoding {} at {}Hz", path.display(), sample_rate);
        self.run(vec![
            OsStr::new("-i"),
            path.as_os_str(),
            OsStr::new("-ac"),
            OsStr::new("1"),
            OsStr::new("-ar"),
            OsStr::new(&rate),
            OsStr::new("-c:a"),
            OsStr::new("pcm_s16le"),
            OsStr::new("-f"),
            OsStr::new("wav"),
            wav_path.as_os_str(),
        ])
        .await
        .with_context(|| format!("Failed to decode {}", path.display()))?;

        WavCodec.decode(&wav_path, sample_rate).await
    }

    async fn encode(&self, track: &AudioTrack, path: &Path) -> Result<()> {
        if is_wav(path) {
            return WavCodec.encode(track, path).await;
        }

        let temp_dir = tempfile::Builder::new().prefix("narration-encode").tempdir()?;
        let wav_path = temp_dir.path().join("mix.wav");
        WavCodec.encode(track, &wav_path).await?;

        let mut args = vec![OsStr::new("-i"), wav_path.as_os_str()];
        let is_mp3 = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"));
        if is_mp3 {
            args.extend([OsStr::new("-codec:a"), OsStr::new("libmp3lame")]);
        }
        args.extend([OsStr::new("-b:a"), OsStr::new(&self.bitrate), path.as_os_str()]);

        self.run(args)
            .await
            .with_context(|| format!("Failed to encode {}", path.display()))?;

        info!("💾 Wrote {} ({:.2}s)", path.display(), track.duration_secs());
        Ok(())
    }
}

/// Remove a transient file, logging instead of failing
pub async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}
