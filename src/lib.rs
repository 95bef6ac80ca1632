//! narration-kit
//!
//! Narration synthesis, duration measurement, scene timing and YouTube
//! publishing for narrated explainer videos.

pub mod audio;
pub mod config;
pub mod measure;
pub mod publish;
pub mod scene;
pub mod synthesis;
pub mod tts;

// Re-export main types for easy access
pub use crate::audio::{AudioCodec, AudioTrack, FfmpegCodec, OverlayReport, WavCodec};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::measure::{cumulative_cues, measure_durations, Measurement, MeasurementReport};
pub use crate::publish::{publish, PublishOptions};
pub use crate::scene::{timing_plan, SectionTiming};
pub use crate::synthesis::{synthesize_narration, Cue, NarrationJob, NarrationReport};
pub use crate::tts::{
    create_synthesizer, SpeechRate, SpeechSynthesizer, TtsConfig, TtsProvider, VoiceSettings,
};
