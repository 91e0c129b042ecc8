use serde::Deserialize;

use super::snap::{FrameLayout, PeakWindow};
use crate::audio::PitchFrame;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Thresholds of the rest-vs-note decision.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PitchPolicy {
    /// Head of every chunk ignored as scoop/attack
    pub skip_fraction: f64,
    /// Frames at or below this confidence do not vote
    pub min_confidence: f32,
    /// Composite loudness-confidence score below which a chunk is a rest
    pub rest_threshold: f64,
    /// Seconds added on both sides of a chunk when measuring its loudness
    pub rms_margin: f64,
    /// A peak within this head fraction moves the window earlier by the same amount
    pub early_fraction: f64,
}

impl Default for PitchPolicy {
    fn default() -> Self {
        Self {
            skip_fraction: 0.1,
            min_confidence: 0.5,
            rest_threshold: 0.03,
            rms_margin: 0.05,
            early_fraction: 0.2,
        }
    }
}

impl PitchPolicy {
    pub fn frame_layout(&self, frame_rate: f64, chunk_duration: f64) -> FrameLayout {
        FrameLayout::new(frame_rate, chunk_duration, self.skip_fraction, self.early_fraction)
    }
}

/// Outcome for one pitch chunk.
#[derive(Clone, Debug, PartialEq)]
pub enum PitchDecision {
    Rest {
        /// 0.0 when no frame qualified, otherwise the composite score
        confidence: f64,
        confidence_rms: f64,
        rms: f64,
    },
    Note {
        name: String,
        hz: f64,
        /// Confidence of the peak frame in the analyzed window
        confidence: f64,
        confidence_rms: f64,
        rms: f64,
    },
}

impl PitchDecision {
    /// Placeholder for a chunk that produced no frames at all.
    pub fn empty(rms: f64) -> Self {
        PitchDecision::Rest {
            confidence: 0.0,
            confidence_rms: 0.0,
            rms,
        }
    }
}

/// Confidence-weighted mean in log2 space, i.e. a weighted geometric mean.
/// Expects non-empty input with positive frequencies and weights.
pub fn log_weighted_average(voiced: &[(f32, f32)]) -> f64 {
    let (num, den) = voiced.iter().fold((0.0f64, 0.0f64), |(num, den), &(hz, conf)| {
        (num + conf as f64 * (hz as f64).log2(), den + conf as f64)
    });
    2f64.powf(num / den)
}

/// Nearest equal-tempered note in sharp notation, e.g. `A4`, `C#5`.
pub fn hz_to_note(hz: f64) -> String {
    let midi = (12.0 * (hz / 440.0).log2() + 69.0).round() as i64;
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", name, octave)
}

/// Reduce the frames of one chunk plus its loudness to a note or a rest.
pub fn decide(
    frames: &[PitchFrame],
    window: &PeakWindow,
    chunk_rms: f32,
    policy: &PitchPolicy,
) -> PitchDecision {
    let analyzed = &frames[window.frames.clone()];
    let rms = chunk_rms as f64;

    let voiced: Vec<(f32, f32)> = analyzed
        .iter()
        .filter(|f| f.frequency_hz > 0.0 && f.confidence > policy.min_confidence)
        .map(|f| (f.frequency_hz, f.confidence))
        .collect();

    if voiced.is_empty() {
        return PitchDecision::empty(rms);
    }

    let composite = voiced
        .iter()
        .map(|&(_, conf)| conf as f64 * rms)
        .sum::<f64>()
        / voiced.len() as f64;

    if composite < policy.rest_threshold {
        return PitchDecision::Rest {
            confidence: composite,
            confidence_rms: composite,
            rms,
        };
    }

    let hz = log_weighted_average(&voiced);
    let confidence = window
        .peak
        .map_or(0.0, |p| analyzed[p].confidence as f64);

    PitchDecision::Note {
        name: hz_to_note(hz),
        hz,
        confidence,
        confidence_rms: composite,
        rms,
    }
}
