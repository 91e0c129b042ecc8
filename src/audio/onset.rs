use anyhow::Result;

use super::spectral::Spectrogram;
use super::waveform::Waveform;
use crate::engine::OnsetDetector;

const FRAME_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

/// Spectral-flux onset detector with adaptive thresholding and backtracking.
///
/// Frames are centered (half a frame of zero padding at the front), so frame
/// `k` describes time `k * hop / sample_rate`. Each picked peak is moved back
/// to the preceding minimum of the flux envelope, which lands on the start of
/// the attack rather than its steepest point.
#[derive(Clone, Debug)]
pub struct SpectralFluxOnsets {
    pub frame_size: usize,
    pub hop_size: usize,
    /// Minimum spacing between picked peaks, seconds
    pub min_gap: f64,
    /// Half-width of the local-mean threshold window, frames
    pub threshold_window: usize,
}

impl Default for SpectralFluxOnsets {
    fn default() -> Self {
        Self {
            frame_size: FRAME_SIZE,
            hop_size: HOP_SIZE,
            min_gap: 0.1,
            threshold_window: 20,
        }
    }
}

impl SpectralFluxOnsets {
    /// Positive spectral flux per hop.
    pub fn envelope(&self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }

        let spec = Spectrogram::compute(samples, sample_rate, self.frame_size, self.hop_size);

        // The first frame has nothing to rise from.
        let mut flux_values = vec![0.0f32];
        flux_values.extend(spec.frames.windows(2).map(|pair| {
            pair[1]
                .iter()
                .zip(pair[0].iter())
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum::<f32>()
        }));

        flux_values
    }

    /// Peak frames of the envelope, before backtracking.
    fn pick_peaks(&self, envelope: &[f32], frame_seconds: f64) -> Vec<usize> {
        let mut peaks: Vec<usize> = Vec::new();
        let window = self.threshold_window;

        for i in 0..envelope.len() {
            let start = i.saturating_sub(window);
            let end = (i + window + 1).min(envelope.len());
            let local_mean: f32 =
                envelope[start..end].iter().sum::<f32>() / (end - start) as f32;

            let threshold = local_mean * 1.5 + 0.01;
            if envelope[i] <= threshold {
                continue;
            }

            let is_peak = (i == 0 || envelope[i] >= envelope[i - 1])
                && (i == envelope.len() - 1 || envelope[i] >= envelope[i + 1]);

            let far_enough = peaks
                .last()
                .map_or(true, |&last| (i - last) as f64 * frame_seconds > self.min_gap);

            if is_peak && far_enough {
                peaks.push(i);
            }
        }

        peaks
    }
}

/// Walk back from a peak to the start of its rising edge.
fn backtrack(envelope: &[f32], peak: usize) -> usize {
    let mut j = peak;
    while j > 0 && envelope[j - 1] < envelope[j] {
        j -= 1;
    }
    j
}

impl OnsetDetector for SpectralFluxOnsets {
    fn detect_onsets(&self, waveform: &Waveform) -> Result<Vec<f64>> {
        anyhow::ensure!(waveform.sample_rate() > 0, "Waveform has no sample rate");

        let envelope = self.envelope(waveform.samples(), waveform.sample_rate());
        let frame_seconds = self.hop_size as f64 / waveform.sample_rate() as f64;

        let mut frames: Vec<usize> = self
            .pick_peaks(&envelope, frame_seconds)
            .into_iter()
            .map(|peak| backtrack(&envelope, peak))
            .collect();
        frames.dedup();

        let onsets: Vec<f64> = frames.iter().map(|&f| f as f64 * frame_seconds).collect();
        log::debug!("Detected {} onsets: {:?}", onsets.len(), onsets);
        Ok(onsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ENGINE_SAMPLE_RATE;

    fn clicks(at: &[f64], duration: f64) -> Waveform {
        let sr = ENGINE_SAMPLE_RATE as f64;
        let mut samples = vec![0.0f32; (duration * sr) as usize];
        for &t in at {
            let start = (t * sr) as usize;
            for i in 0..800 {
                if let Some(s) = samples.get_mut(start + i) {
                    let decay = (-(i as f32) / 200.0).exp();
                    *s = 0.8 * decay * if i % 2 == 0 { 1.0 } else { -1.0 };
                }
            }
        }
        Waveform::new(samples, ENGINE_SAMPLE_RATE)
    }

    #[test]
    fn silence_has_no_onsets() {
        let wf = Waveform::new(vec![0.0; 32_000], ENGINE_SAMPLE_RATE);
        let onsets = SpectralFluxOnsets::default().detect_onsets(&wf).unwrap();
        assert!(onsets.is_empty());
    }

    #[test]
    fn finds_clicks_near_their_start() {
        let wf = clicks(&[0.5, 1.0, 1.5], 2.0);
        let onsets = SpectralFluxOnsets::default().detect_onsets(&wf).unwrap();
        assert_eq!(onsets.len(), 3, "onsets: {:?}", onsets);
        for (found, expected) in onsets.iter().zip([0.5, 1.0, 1.5]) {
            // backtracking lands a few frames ahead of the attack
            assert!((found - expected).abs() < 0.12, "{} vs {}", found, expected);
        }
        assert!(onsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn backtrack_stops_at_local_minimum() {
        let env = [0.0, 3.0, 1.0, 2.0, 5.0, 9.0, 4.0];
        assert_eq!(backtrack(&env, 5), 2);
        assert_eq!(backtrack(&env, 1), 0);
    }
}
