pub mod decode;
pub mod onset;
pub mod pitch;
pub mod spectral;
pub mod waveform;

pub use waveform::{rms, PitchFrame, PitchTrack, Waveform, ENGINE_SAMPLE_RATE};
