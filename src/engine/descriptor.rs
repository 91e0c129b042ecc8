//! Fixed-length chunk descriptors for the percussion classifier.
//!
//! The classifier was trained against one exact feature ordering; any change
//! to the layout below invalidates the model:
//!
//! | slots   | feature                                  |
//! |---------|------------------------------------------|
//! | 0-25    | MFCC 1-13 mean, then std                 |
//! | 26-51   | MFCC delta mean, then std                |
//! | 52-53   | zero-crossing rate mean, std             |
//! | 54-55   | RMS mean, std                            |
//! | 56-57   | spectral centroid mean, std              |
//! | 58-59   | spectral bandwidth mean, std             |
//! | 60-61   | spectral flatness mean, std              |
//! | 62-63   | spectral rolloff mean, std               |
//! | 64-77   | spectral contrast (7 bands) mean, std    |
//! | 78      | spectral flux                            |
//! | 79      | energy ratio at or above 4 kHz           |
//! | 80-103  | chroma (12 classes) mean, std            |

use crate::audio::spectral::{self, Spectrogram, HOP_LENGTH, N_FFT};
use crate::audio::rms;

pub const DESCRIPTOR_LEN: usize = 104;

const HIGH_ENERGY_CUTOFF_HZ: f32 = 4000.0;

/// Chunk summary handed to the classifier.
#[derive(Clone, Debug, PartialEq)]
pub enum Descriptor {
    /// Quiet chunk; the spectral pipeline was never run
    Silent,
    Described(Vec<f32>),
}

impl Descriptor {
    pub fn is_silent(&self) -> bool {
        matches!(self, Descriptor::Silent)
    }

    /// Classifier input row. Silence maps to the all-zero vector.
    pub fn to_vector(&self) -> Vec<f32> {
        match self {
            Descriptor::Silent => vec![0.0; DESCRIPTOR_LEN],
            Descriptor::Described(values) => values.clone(),
        }
    }
}

/// Builds descriptors, gating silent chunks before any spectral work.
#[derive(Clone, Debug)]
pub struct DescriptorBuilder {
    pub sample_rate: u32,
    /// Chunks with RMS below this are `Silent`
    pub silence_rms: f32,
}

impl DescriptorBuilder {
    pub fn new(sample_rate: u32, silence_rms: f32) -> Self {
        Self {
            sample_rate,
            silence_rms,
        }
    }

    pub fn build(&self, chunk: &[f32]) -> Descriptor {
        if rms(chunk) < self.silence_rms {
            return Descriptor::Silent;
        }
        Descriptor::Described(self.describe(chunk))
    }

    fn describe(&self, chunk: &[f32]) -> Vec<f32> {
        let spec = Spectrogram::compute(chunk, self.sample_rate, N_FFT, HOP_LENGTH);

        let mfccs = spectral::mfcc(&spec);
        let deltas = spectral::delta(&mfccs, spectral::delta_width(spec.num_frames()));
        let centroid = spectral::spectral_centroid(&spec);

        let mut out = Vec::with_capacity(DESCRIPTOR_LEN);
        push_mean_then_std(&mut out, &mfccs);
        push_mean_then_std(&mut out, &deltas);
        push_mean_std(&mut out, &spectral::zero_crossing_rate(chunk));
        push_mean_std(&mut out, &spectral::frame_rms(chunk));
        push_mean_std(&mut out, &centroid);
        push_mean_std(&mut out, &spectral::spectral_bandwidth(&spec, &centroid));
        push_mean_std(&mut out, &spectral::spectral_flatness(&spec));
        push_mean_std(&mut out, &spectral::spectral_rolloff(&spec));
        push_mean_then_std(&mut out, &spectral::spectral_contrast(&spec));
        out.push(spectral::spectral_flux(&spec));
        out.push(spectral::high_energy_ratio(&spec, HIGH_ENERGY_CUTOFF_HZ));
        push_mean_then_std(&mut out, &spectral::chroma(&spec));

        debug_assert_eq!(out.len(), DESCRIPTOR_LEN);
        out
    }
}

fn push_mean_std(out: &mut Vec<f32>, values: &[f32]) {
    let (mean, std) = spectral::mean_std(values);
    out.push(mean);
    out.push(std);
}

/// All row means, then all row standard deviations.
fn push_mean_then_std(out: &mut Vec<f32>, rows: &[Vec<f32>]) {
    let stats: Vec<(f32, f32)> = rows.iter().map(|row| spectral::mean_std(row)).collect();
    out.extend(stats.iter().map(|(mean, _)| *mean));
    out.extend(stats.iter().map(|(_, std)| *std));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ENGINE_SAMPLE_RATE;

    fn noise_burst(len: usize, amplitude: f32) -> Vec<f32> {
        // deterministic pseudo-noise
        let mut state = 0x2545_f491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                amplitude * ((state as f32 / u32::MAX as f32) * 2.0 - 1.0)
            })
            .collect()
    }

    #[test]
    fn quiet_chunk_is_silent() {
        let builder = DescriptorBuilder::new(ENGINE_SAMPLE_RATE, 0.05);
        let chunk = noise_burst(3600, 0.04);
        let descriptor = builder.build(&chunk);
        assert!(descriptor.is_silent());
        assert_eq!(descriptor.to_vector(), vec![0.0; DESCRIPTOR_LEN]);
    }

    #[test]
    fn loud_chunk_has_full_length_descriptor() {
        let builder = DescriptorBuilder::new(ENGINE_SAMPLE_RATE, 0.05);
        let chunk = noise_burst(3600, 0.8);
        match builder.build(&chunk) {
            Descriptor::Described(values) => {
                assert_eq!(values.len(), DESCRIPTOR_LEN);
                assert!(values.iter().all(|v| v.is_finite()));
                // white noise sits well above 4 kHz too
                assert!(values[79] > 0.35);
                // RMS mean slot
                assert!(values[54] > 0.2);
            }
            Descriptor::Silent => panic!("loud chunk gated as silent"),
        }
    }

    #[test]
    fn descriptors_are_deterministic() {
        let builder = DescriptorBuilder::new(ENGINE_SAMPLE_RATE, 0.05);
        let chunk = noise_burst(2000, 0.5);
        assert_eq!(builder.build(&chunk), builder.build(&chunk));
    }
}
