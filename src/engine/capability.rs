//! Contracts for the external collaborators the engine consumes.
//!
//! Implementations report failures through `anyhow`; the engine wraps them in
//! [`EngineError::Capability`](crate::error::EngineError) so callers can tell a
//! broken model apart from bad audio.

use anyhow::Result;

use crate::audio::{PitchTrack, Waveform};

/// Detects attack times in a recording.
pub trait OnsetDetector {
    /// Onset times in seconds, ascending. May be empty.
    fn detect_onsets(&self, waveform: &Waveform) -> Result<Vec<f64>>;
}

/// Estimates a pitch/confidence curve over a whole recording.
///
/// Takes `&mut self`: trackers are not assumed to be internally synchronized.
pub trait PitchTracker {
    fn track_pitch(&mut self, waveform: &Waveform) -> Result<PitchTrack>;
}
