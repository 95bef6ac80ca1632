//! Scene pacing: each section's animations plus its wait must fill the narration

use crate::measure::Measurement;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub struct SectionTiming {
    pub index: usize,
    pub text: String,
    pub narration_secs: f64,
    pub animation_secs: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl SectionTiming {
    /// Time to hold after the animations so the section ends with its narration
    pub fn wait_secs(&self) -> f64 {
        round2((self.narration_secs - self.animation_secs).max(0.0))
    }

    /// How far the animations outlast the narration, zero when they fit
    pub fn overrun_secs(&self) -> f64 {
        round2((self.animation_secs - self.narration_secs).max(0.0))
    }
}

/// One section per measured line, each assuming `animation_secs` of animation
pub fn timing_plan(measurements: &[Measurement], animation_secs: f64) -> Vec<SectionTiming> {
    let animation_secs = animation_secs.max(0.0);
    measurements
        .iter()
        .map(|m| SectionTiming {
            index: m.index,
            text: m.text.clone(),
            narration_secs: m.duration_secs,
            animation_secs,
        })
        .collect()
}

/// Comment and wait lines ready to drop into a scene's `construct`
pub fn render_plan(sections: &[SectionTiming]) -> String {
    let mut out = String::new();
    for section in sections {
        let _ = writeln!(
            out,
            "# Narration {}: [{:.2}s] {}",
            section.index, section.narration_secs, section.text
        );
        if section.overrun_secs() > 0.0 {
            let _ = writeln!(
                out,
                "# animations run {:.2}s longer than the narration",
                section.overrun_secs()
            );
        }
        let _ = writeln!(out, "self.wait({:.2})", section.wait_secs());
    }
    out
}
