/// Sample rate every waveform is converted to before analysis.
pub const ENGINE_SAMPLE_RATE: u32 = 16_000;

/// Mono PCM recording, amplitudes in [-1, 1].
#[derive(Clone, Debug)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples between two times, truncating both to whole sample indices.
    /// Out-of-range times are clamped, so the slice may be empty.
    pub fn slice_seconds(&self, start: f64, end: f64) -> &[f32] {
        let len = self.samples.len();
        let sr = self.sample_rate as f64;
        let from = ((sr * start.max(0.0)) as usize).min(len);
        let to = ((sr * end.max(0.0)) as usize).min(len);
        if from >= to {
            return &[];
        }
        &self.samples[from..to]
    }
}

/// Root-mean-square amplitude, 0.0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// One analysis frame of the pitch tracker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchFrame {
    pub time: f64,
    pub frequency_hz: f32,
    /// Voicing confidence in [0, 1]
    pub confidence: f32,
}

/// Pitch curve over a whole recording at a fixed frame rate.
#[derive(Clone, Debug)]
pub struct PitchTrack {
    pub frames: Vec<PitchFrame>,
    /// Frames per second
    pub frame_rate: f64,
}

impl PitchTrack {
    pub fn confidences(&self) -> Vec<f32> {
        self.frames.iter().map(|f| f.confidence).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_truncates_to_sample_indices() {
        let wf = Waveform::new((0..16).map(|i| i as f32).collect(), 8);
        assert_eq!(wf.slice_seconds(0.5, 1.0), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(wf.slice_seconds(1.5, 9.0).len(), 4);
        assert!(wf.slice_seconds(3.0, 4.0).is_empty());
        assert_eq!(wf.slice_seconds(-1.0, 0.25), &[0.0, 1.0]);
    }

    #[test]
    fn rms_of_constant_signal() {
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn duration_in_seconds() {
        let wf = Waveform::new(vec![0.0; 24_000], ENGINE_SAMPLE_RATE);
        assert!((wf.duration() - 1.5).abs() < 1e-12);
    }
}
