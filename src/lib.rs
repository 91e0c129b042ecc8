//! Tempo-grid segmentation of beatboxed and hummed recordings.
//!
//! A recording is cut into the eighth- or sixteenth-note cells of a fixed
//! tempo and bar count. [`Engine::segment_for_classification`] labels every
//! cell as kick, snare, hihat or noise; [`Engine::segment_for_pitch`] turns
//! every cell into a note or a rest.
//!
//! ```no_run
//! use beatgrid::audio::{decode, onset::SpectralFluxOnsets, pitch::McLeodPitchTracker};
//! use beatgrid::{Capabilities, Engine, TempoSpec};
//!
//! # fn main() -> anyhow::Result<()> {
//! let waveform = decode::decode_file("hum.wav".as_ref())?;
//! let engine = Engine::new(Capabilities::new(
//!     SpectralFluxOnsets::default(),
//!     McLeodPitchTracker::new(true),
//! ));
//! let notes = engine.segment_for_pitch(&waveform, &TempoSpec::pitch(100.0, 2)?)?;
//! println!("{}", serde_json::to_string(&notes)?);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;

pub use audio::Waveform;
pub use engine::{
    Capabilities, ClassSegment, ClassifyPolicy, DrumLabel, Engine, PitchPolicy, PitchSegment,
    SilencePolicy, TempoSpec,
};
pub use error::{EngineError, EngineResult};
