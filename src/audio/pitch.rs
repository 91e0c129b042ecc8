use anyhow::Result;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::waveform::{rms, PitchFrame, PitchTrack, Waveform};
use crate::engine::PitchTracker;

/// McLeod pitch method (normalized square difference function) tracker.
///
/// Produces one frame every `hop` samples over the whole recording, frame `k`
/// centered on sample `k * hop`. The NSDF value at the chosen period is the
/// frame's clarity, reported as confidence. Unvoiced or silent frames carry
/// frequency 0.
pub struct McLeodPitchTracker {
    pub window: usize,
    pub hop: usize,
    pub min_hz: f32,
    pub max_hz: f32,
    /// Fraction of the highest key maximum a candidate period must reach
    pub key_threshold: f32,
    /// Frames quieter than this are not analyzed
    pub silence_rms: f32,
    /// Median-smooth voiced frequencies over five frames
    pub smoothing: bool,
    planner: FftPlanner<f32>,
}

impl McLeodPitchTracker {
    pub fn new(smoothing: bool) -> Self {
        Self {
            window: 1024,
            hop: 160,
            min_hz: 60.0,
            max_hz: 1600.0,
            key_threshold: 0.9,
            silence_rms: 1e-3,
            smoothing,
            planner: FftPlanner::new(),
        }
    }

    fn nsdf(&self, frame: &[f32], fft: &Arc<dyn Fft<f32>>, ifft: &Arc<dyn Fft<f32>>) -> Vec<f32> {
        let w = frame.len();
        let n = 2 * w;

        // Autocorrelation through the power spectrum.
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(n - w))
            .collect();
        fft.process(&mut buffer);
        for c in buffer.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        ifft.process(&mut buffer);

        let mut m = 2.0 * frame.iter().map(|s| s * s).sum::<f32>();
        let mut out = vec![0.0f32; w];
        for tau in 0..w {
            if tau > 0 {
                m -= frame[tau - 1] * frame[tau - 1] + frame[w - tau] * frame[w - tau];
            }
            let r = buffer[tau].re / n as f32;
            out[tau] = if m > 1e-12 { 2.0 * r / m } else { 0.0 };
        }
        out
    }

    /// (frequency, clarity) of one window.
    fn analyze_frame(
        &self,
        frame: &[f32],
        sample_rate: f32,
        fft: &Arc<dyn Fft<f32>>,
        ifft: &Arc<dyn Fft<f32>>,
    ) -> (f32, f32) {
        if rms(frame) < self.silence_rms {
            return (0.0, 0.0);
        }

        let nsdf = self.nsdf(frame, fft, ifft);
        let max_lag = ((sample_rate / self.min_hz) as usize).min(nsdf.len() - 1);
        let min_lag = ((sample_rate / self.max_hz) as usize).max(1);

        let maxima = key_maxima(&nsdf[..=max_lag]);
        let Some(highest) = maxima.iter().map(|&t| nsdf[t]).reduce(f32::max) else {
            return (0.0, 0.0);
        };

        let threshold = self.key_threshold * highest;
        let Some(&tau) = maxima
            .iter()
            .find(|&&t| t >= min_lag && nsdf[t] >= threshold)
        else {
            return (0.0, 0.0);
        };

        let (period, clarity) = if tau + 1 < nsdf.len() {
            parabolic_peak(nsdf[tau - 1], nsdf[tau], nsdf[tau + 1], tau)
        } else {
            (tau as f32, nsdf[tau])
        };

        if period <= 0.0 {
            return (0.0, 0.0);
        }
        (sample_rate / period, clarity.clamp(0.0, 1.0))
    }
}

/// Highest point of every positive NSDF lobe after the first negative dip.
fn key_maxima(nsdf: &[f32]) -> Vec<usize> {
    let mut maxima = Vec::new();
    let mut tau = 1;
    while tau < nsdf.len() && nsdf[tau] > 0.0 {
        tau += 1;
    }

    let mut current: Option<usize> = None;
    while tau < nsdf.len() {
        if nsdf[tau] > 0.0 {
            if current.map_or(true, |c| nsdf[tau] > nsdf[c]) {
                current = Some(tau);
            }
        } else if let Some(c) = current.take() {
            maxima.push(c);
        }
        tau += 1;
    }
    if let Some(c) = current {
        // a lobe cut off by the lag limit only counts if it already turned down
        if c + 1 < nsdf.len() {
            maxima.push(c);
        }
    }
    maxima
}

fn parabolic_peak(a: f32, b: f32, c: f32, tau: usize) -> (f32, f32) {
    let denom = a - 2.0 * b + c;
    if denom.abs() < f32::EPSILON {
        return (tau as f32, b);
    }
    let delta = 0.5 * (a - c) / denom;
    (tau as f32 + delta, b - 0.25 * (a - c) * delta)
}

/// Median of voiced neighbours within two frames, unvoiced frames untouched.
fn median_smooth(frames: &mut [PitchFrame]) {
    let original: Vec<f32> = frames.iter().map(|f| f.frequency_hz).collect();
    for (i, frame) in frames.iter_mut().enumerate() {
        if original[i] <= 0.0 {
            continue;
        }
        let lo = i.saturating_sub(2);
        let hi = (i + 3).min(original.len());
        let mut voiced: Vec<f32> = original[lo..hi].iter().copied().filter(|&f| f > 0.0).collect();
        voiced.sort_by(|a, b| a.total_cmp(b));
        frame.frequency_hz = voiced[voiced.len() / 2];
    }
}

impl PitchTracker for McLeodPitchTracker {
    fn track_pitch(&mut self, waveform: &Waveform) -> Result<PitchTrack> {
        let sample_rate = waveform.sample_rate();
        anyhow::ensure!(sample_rate > 0, "Waveform has no sample rate");
        anyhow::ensure!(self.hop > 0 && self.window > 2, "Invalid pitch tracker framing");

        let samples = waveform.samples();
        let fft = self.planner.plan_fft_forward(2 * self.window);
        let ifft = self.planner.plan_fft_inverse(2 * self.window);
        let half = self.window / 2;

        let num_frames = 1 + samples.len() / self.hop;
        let mut frames: Vec<PitchFrame> = (0..num_frames)
            .map(|k| {
                let center = k * self.hop;
                let window: Vec<f32> = (0..self.window)
                    .map(|i| {
                        (center + i)
                            .checked_sub(half)
                            .and_then(|idx| samples.get(idx))
                            .copied()
                            .unwrap_or(0.0)
                    })
                    .collect();
                let (frequency_hz, confidence) =
                    self.analyze_frame(&window, sample_rate as f32, &fft, &ifft);
                PitchFrame {
                    time: center as f64 / sample_rate as f64,
                    frequency_hz,
                    confidence,
                }
            })
            .collect();

        if self.smoothing {
            median_smooth(&mut frames);
        }

        let voiced = frames.iter().filter(|f| f.frequency_hz > 0.0).count();
        log::debug!("Pitch track: {} frames, {} voiced", frames.len(), voiced);

        Ok(PitchTrack {
            frames,
            frame_rate: sample_rate as f64 / self.hop as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ENGINE_SAMPLE_RATE;

    fn tone(freq: f32, seconds: f32) -> Waveform {
        let sr = ENGINE_SAMPLE_RATE as f32;
        let samples = (0..(seconds * sr) as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect();
        Waveform::new(samples, ENGINE_SAMPLE_RATE)
    }

    #[test]
    fn tracks_a_steady_tone() {
        let track = McLeodPitchTracker::new(true).track_pitch(&tone(220.0, 1.0)).unwrap();
        assert_eq!(track.frame_rate, 100.0);
        assert_eq!(track.frames.len(), 101);
        let middle = &track.frames[50];
        assert!((middle.frequency_hz - 220.0).abs() < 2.0, "hz {}", middle.frequency_hz);
        assert!(middle.confidence > 0.9, "confidence {}", middle.confidence);
        assert!((middle.time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn silence_is_unvoiced() {
        let wf = Waveform::new(vec![0.0; 8000], ENGINE_SAMPLE_RATE);
        let track = McLeodPitchTracker::new(false).track_pitch(&wf).unwrap();
        assert!(track
            .frames
            .iter()
            .all(|f| f.frequency_hz == 0.0 && f.confidence == 0.0));
    }

    #[test]
    fn median_smoothing_removes_octave_spike() {
        let mut frames: Vec<PitchFrame> = [220.0, 220.0, 440.0, 220.0, 220.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, &hz)| PitchFrame {
                time: i as f64 * 0.01,
                frequency_hz: hz,
                confidence: 0.9,
            })
            .collect();
        median_smooth(&mut frames);
        assert_eq!(frames[2].frequency_hz, 220.0);
        assert_eq!(frames[5].frequency_hz, 0.0);
    }

    #[test]
    fn key_maxima_skip_the_zero_lag_lobe() {
        let nsdf = [1.0, 0.5, -0.2, 0.3, 0.8, 0.4, -0.1, 0.6, 0.2];
        assert_eq!(key_maxima(&nsdf), vec![4, 7]);
    }
}
