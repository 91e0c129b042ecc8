//! Spectral and cepstral primitives over short chunks.
//!
//! Frame layout follows the usual centered-STFT convention: frame `k` is
//! centered on sample `k * hop`, with half a frame of padding at both ends.
//! Per-frame outputs are returned band-major (`[band][frame]`) so that
//! per-band mean/std summaries are a single pass over each row.

use rustfft::{num_complex::Complex, FftPlanner};

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;
pub const N_MFCC: usize = 13;
pub const N_CHROMA: usize = 12;
/// Six octave bands above `CONTRAST_FMIN` plus the band below it.
pub const N_CONTRAST: usize = 7;

const N_MELS: usize = 128;
const CONTRAST_FMIN: f32 = 200.0;
const CONTRAST_QUANTILE: f32 = 0.02;
const ROLLOFF_PERCENT: f32 = 0.85;
const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;

/// Magnitude STFT of a chunk.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    /// `frames[t][k]`, `n_fft / 2 + 1` bins per frame
    pub frames: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub n_fft: usize,
}

impl Spectrogram {
    pub fn compute(samples: &[f32], sample_rate: u32, n_fft: usize, hop: usize) -> Self {
        let half = n_fft / 2;
        let bins = half + 1;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let hann = hann_window(n_fft);

        let num_frames = 1 + samples.len() / hop;
        let frames = (0..num_frames)
            .map(|frame| {
                let center = frame * hop;
                let mut buffer: Vec<Complex<f32>> = (0..n_fft)
                    .map(|i| {
                        let s = (center + i)
                            .checked_sub(half)
                            .and_then(|idx| samples.get(idx))
                            .copied()
                            .unwrap_or(0.0);
                        Complex::new(s * hann[i], 0.0)
                    })
                    .collect();
                fft.process(&mut buffer);
                buffer[..bins].iter().map(|c| c.norm()).collect()
            })
            .collect();

        Self {
            frames,
            sample_rate,
            n_fft,
        }
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Center frequency of every bin, Hz
    pub fn frequencies(&self) -> Vec<f32> {
        let resolution = self.sample_rate as f32 / self.n_fft as f32;
        (0..self.num_bins()).map(|k| k as f32 * resolution).collect()
    }
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Population mean and standard deviation; zeros for an empty slice.
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    (mean, var.sqrt())
}

#[derive(Clone, Copy)]
enum Padding {
    Zero,
    Edge,
}

/// Centered time-domain frames of `frame_len` samples every `hop`.
fn time_frames(samples: &[f32], frame_len: usize, hop: usize, padding: Padding) -> Vec<Vec<f32>> {
    if samples.is_empty() {
        return Vec::new();
    }
    let half = frame_len / 2;
    let last = samples.len() - 1;
    let num_frames = 1 + samples.len() / hop;
    (0..num_frames)
        .map(|frame| {
            let center = frame * hop;
            (0..frame_len)
                .map(|i| {
                    let pos = (center + i) as isize - half as isize;
                    match padding {
                        Padding::Zero => {
                            if pos < 0 {
                                0.0
                            } else {
                                samples.get(pos as usize).copied().unwrap_or(0.0)
                            }
                        }
                        Padding::Edge => samples[pos.clamp(0, last as isize) as usize],
                    }
                })
                .collect()
        })
        .collect()
}

/// Fraction of sign changes per frame; zero counts as positive.
pub fn zero_crossing_rate(samples: &[f32]) -> Vec<f32> {
    time_frames(samples, N_FFT, HOP_LENGTH, Padding::Edge)
        .iter()
        .map(|frame| {
            let crossings = frame
                .windows(2)
                .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
                .count();
            crossings as f32 / frame.len() as f32
        })
        .collect()
}

pub fn frame_rms(samples: &[f32]) -> Vec<f32> {
    time_frames(samples, N_FFT, HOP_LENGTH, Padding::Zero)
        .iter()
        .map(|frame| super::waveform::rms(frame))
        .collect()
}

pub fn spectral_centroid(spec: &Spectrogram) -> Vec<f32> {
    let freqs = spec.frequencies();
    spec.frames
        .iter()
        .map(|mags| {
            let total: f32 = mags.iter().sum();
            if total <= 0.0 {
                return 0.0;
            }
            mags.iter().zip(&freqs).map(|(m, f)| m * f).sum::<f32>() / total
        })
        .collect()
}

/// Second-order spread around each frame's centroid.
pub fn spectral_bandwidth(spec: &Spectrogram, centroids: &[f32]) -> Vec<f32> {
    let freqs = spec.frequencies();
    spec.frames
        .iter()
        .zip(centroids)
        .map(|(mags, &centroid)| {
            let total: f32 = mags.iter().sum();
            if total <= 0.0 {
                return 0.0;
            }
            mags.iter()
                .zip(&freqs)
                .map(|(m, f)| (m / total) * (f - centroid) * (f - centroid))
                .sum::<f32>()
                .sqrt()
        })
        .collect()
}

/// Geometric over arithmetic mean of the power spectrum.
pub fn spectral_flatness(spec: &Spectrogram) -> Vec<f32> {
    spec.frames
        .iter()
        .map(|mags| {
            let n = mags.len() as f32;
            let power: Vec<f32> = mags.iter().map(|m| (m * m).max(AMIN)).collect();
            let log_mean = power.iter().map(|p| p.ln()).sum::<f32>() / n;
            let arith_mean = power.iter().sum::<f32>() / n;
            log_mean.exp() / arith_mean
        })
        .collect()
}

/// Lowest frequency below which 85% of the frame's magnitude lies.
pub fn spectral_rolloff(spec: &Spectrogram) -> Vec<f32> {
    let freqs = spec.frequencies();
    spec.frames
        .iter()
        .map(|mags| {
            let threshold = ROLLOFF_PERCENT * mags.iter().sum::<f32>();
            let mut cumulative = 0.0f32;
            for (m, f) in mags.iter().zip(&freqs) {
                cumulative += m;
                if cumulative >= threshold {
                    return *f;
                }
            }
            freqs.last().copied().unwrap_or(0.0)
        })
        .collect()
}

/// Peak-to-valley contrast in dB per octave band, `[band][frame]`.
pub fn spectral_contrast(spec: &Spectrogram) -> Vec<Vec<f32>> {
    let freqs = spec.frequencies();
    let bins = freqs.len();
    let n_bands = N_CONTRAST - 1;

    let mut edges = vec![0.0f32];
    edges.extend((0..=n_bands).map(|i| CONTRAST_FMIN * 2f32.powi(i as i32)));

    let mut contrast = vec![vec![0.0f32; spec.num_frames()]; N_CONTRAST];

    for band in 0..N_CONTRAST {
        let (f_low, f_high) = (edges[band], edges[band + 1]);
        let in_band: Vec<usize> = (0..bins)
            .filter(|&k| freqs[k] >= f_low && freqs[k] <= f_high)
            .collect();
        let (Some(&first), Some(&last)) = (in_band.first(), in_band.last()) else {
            continue;
        };

        let mut lo = first;
        let mut hi = last + 1;
        if band > 0 && lo > 0 {
            lo -= 1;
        }
        if band == n_bands {
            hi = bins;
        } else if hi - lo > 1 {
            // neighbouring bands share their edge bin only once
            hi -= 1;
        }

        for (t, mags) in spec.frames.iter().enumerate() {
            let mut values: Vec<f32> = mags[lo..hi].to_vec();
            values.sort_by(|a, b| a.total_cmp(b));
            let n_q = ((CONTRAST_QUANTILE * values.len() as f32).round() as usize).max(1);
            let valley = values[..n_q].iter().sum::<f32>() / n_q as f32;
            let peak = values[values.len() - n_q..].iter().sum::<f32>() / n_q as f32;
            contrast[band][t] = power_to_db(peak) - power_to_db(valley);
        }
    }

    contrast
}

fn power_to_db(value: f32) -> f32 {
    10.0 * value.max(AMIN).log10()
}

/// RMS of frame-to-frame magnitude differences over the whole chunk.
pub fn spectral_flux(spec: &Spectrogram) -> f32 {
    if spec.num_frames() < 2 {
        return 0.0;
    }
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for pair in spec.frames.windows(2) {
        for (cur, prev) in pair[1].iter().zip(&pair[0]) {
            sum += (cur - prev) * (cur - prev);
            count += 1;
        }
    }
    (sum / count as f32).sqrt()
}

/// Mean magnitude at or above `cutoff_hz` relative to the overall mean.
pub fn high_energy_ratio(spec: &Spectrogram, cutoff_hz: f32) -> f32 {
    let freqs = spec.frequencies();
    let mut high_sum = 0.0f32;
    let mut high_count = 0usize;
    let mut total_sum = 0.0f32;
    let mut total_count = 0usize;
    for mags in &spec.frames {
        for (m, f) in mags.iter().zip(&freqs) {
            if *f >= cutoff_hz {
                high_sum += m;
                high_count += 1;
            }
            total_sum += m;
            total_count += 1;
        }
    }
    if total_count == 0 || high_count == 0 {
        return 0.0;
    }
    (high_sum / high_count as f32) / (total_sum / total_count as f32 + 1e-6)
}

/// Pitch-class energy per frame, max-normalized, `[class][frame]` with C = 0.
pub fn chroma(spec: &Spectrogram) -> Vec<Vec<f32>> {
    let freqs = spec.frequencies();
    let classes: Vec<Option<usize>> = freqs
        .iter()
        .map(|&f| {
            if f <= 0.0 {
                return None;
            }
            let midi = 69.0 + 12.0 * (f / 440.0).log2();
            Some((midi.round() as i64).rem_euclid(12) as usize)
        })
        .collect();

    let mut out = vec![vec![0.0f32; spec.num_frames()]; N_CHROMA];
    for (t, mags) in spec.frames.iter().enumerate() {
        let mut energy = [0.0f32; N_CHROMA];
        for (m, class) in mags.iter().zip(&classes) {
            if let Some(c) = class {
                energy[*c] += m * m;
            }
        }
        let max = energy.iter().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            for (c, e) in energy.iter().enumerate() {
                out[c][t] = e / max;
            }
        }
    }
    out
}

fn hz_to_mel(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

/// Slaney-normalized triangular mel filters, `[mel][bin]`.
fn mel_filterbank(freqs: &[f32], sample_rate: u32, n_mels: usize) -> Vec<Vec<f32>> {
    let mel_max = hz_to_mel(sample_rate as f32 / 2.0);
    let hz_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            let enorm = 2.0 / (right - left);
            freqs
                .iter()
                .map(|&f| {
                    let lower = (f - left) / (center - left);
                    let upper = (right - f) / (right - center);
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Cepstral coefficients of the log-mel power spectrum, `[coef][frame]`.
pub fn mfcc(spec: &Spectrogram) -> Vec<Vec<f32>> {
    let freqs = spec.frequencies();
    let filters = mel_filterbank(&freqs, spec.sample_rate, N_MELS);

    let mut log_mel: Vec<Vec<f32>> = spec
        .frames
        .iter()
        .map(|mags| {
            filters
                .iter()
                .map(|filter| {
                    let energy: f32 = filter
                        .iter()
                        .zip(mags)
                        .map(|(w, m)| w * m * m)
                        .sum();
                    power_to_db(energy)
                })
                .collect()
        })
        .collect();

    let max_db = log_mel
        .iter()
        .flatten()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    for row in &mut log_mel {
        for v in row.iter_mut() {
            *v = v.max(max_db - TOP_DB);
        }
    }

    // Orthonormal DCT-II over the mel axis.
    let n = N_MELS as f32;
    let mut out = vec![vec![0.0f32; spec.num_frames()]; N_MFCC];
    for (t, mel) in log_mel.iter().enumerate() {
        for (k, row) in out.iter_mut().enumerate() {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            let sum: f32 = mel
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    v * (std::f32::consts::PI * k as f32 * (2 * i + 1) as f32 / (2.0 * n)).cos()
                })
                .sum();
            row[t] = scale * sum;
        }
    }
    out
}

/// Local regression slope of each row over `width` frames (odd, >= 3).
/// Edge frames reuse the slope of the first/last full window. Widths below
/// three yield zeros.
pub fn delta(rows: &[Vec<f32>], width: usize) -> Vec<Vec<f32>> {
    rows.iter()
        .map(|row| {
            let n = row.len();
            if width < 3 || n < width {
                return vec![0.0; n];
            }
            let h = width / 2;
            let denom: f32 = (1..=h).map(|k| (k * k) as f32).sum::<f32>() * 2.0;
            let slope = |t: usize| -> f32 {
                (1..=h)
                    .map(|k| k as f32 * (row[t + k] - row[t - k]))
                    .sum::<f32>()
                    / denom
            };
            (0..n).map(|t| slope(t.clamp(h, n - 1 - h))).collect()
        })
        .collect()
}

/// Delta width used for a chunk of `frames` frames: at most 5, always odd.
pub fn delta_width(frames: usize) -> usize {
    5.min(frames / 2 * 2 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16_000;

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (seconds * SR as f32) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn spectrogram_frame_count_is_centered() {
        let spec = Spectrogram::compute(&vec![0.0; 3600], SR, N_FFT, HOP_LENGTH);
        assert_eq!(spec.num_frames(), 1 + 3600 / 512);
        assert_eq!(spec.num_bins(), 1025);
    }

    #[test]
    fn centroid_tracks_a_pure_tone() {
        let spec = Spectrogram::compute(&sine(1000.0, 0.5), SR, N_FFT, HOP_LENGTH);
        let centroids = spectral_centroid(&spec);
        let middle = centroids[centroids.len() / 2];
        assert!((middle - 1000.0).abs() < 100.0, "centroid {}", middle);
    }

    #[test]
    fn chroma_of_a440_peaks_at_a() {
        let spec = Spectrogram::compute(&sine(440.0, 0.5), SR, N_FFT, HOP_LENGTH);
        let c = chroma(&spec);
        let t = spec.num_frames() / 2;
        assert!((c[9][t] - 1.0).abs() < 1e-6);
        assert!(c[0][t] < 0.5);
    }

    #[test]
    fn high_energy_ratio_separates_low_and_high_tones() {
        let low = Spectrogram::compute(&sine(200.0, 0.25), SR, N_FFT, HOP_LENGTH);
        let high = Spectrogram::compute(&sine(6000.0, 0.25), SR, N_FFT, HOP_LENGTH);
        assert!(high_energy_ratio(&high, 4000.0) > high_energy_ratio(&low, 4000.0) * 10.0);
    }

    #[test]
    fn delta_of_a_ramp_is_its_slope() {
        let rows = vec![(0..8).map(|i| 2.0 * i as f32).collect::<Vec<_>>()];
        let d = delta(&rows, 5);
        for v in &d[0] {
            assert!((v - 2.0).abs() < 1e-5);
        }
        assert_eq!(delta(&rows, 1)[0], vec![0.0; 8]);
    }

    #[test]
    fn delta_width_stays_odd() {
        assert_eq!(delta_width(8), 5);
        assert_eq!(delta_width(4), 5);
        assert_eq!(delta_width(3), 3);
        assert_eq!(delta_width(1), 1);
    }

    #[test]
    fn zero_crossings_of_alternating_signal() {
        let alternating: Vec<f32> = (0..4096).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let zcr = zero_crossing_rate(&alternating);
        let middle = zcr[zcr.len() / 2];
        assert!(middle > 0.99, "zcr {}", middle);
    }

    #[test]
    fn mean_std_population() {
        let (m, s) = mean_std(&[1.0, 3.0]);
        assert_eq!(m, 2.0);
        assert_eq!(s, 1.0);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn contrast_has_seven_bands() {
        let spec = Spectrogram::compute(&sine(440.0, 0.25), SR, N_FFT, HOP_LENGTH);
        let contrast = spectral_contrast(&spec);
        assert_eq!(contrast.len(), N_CONTRAST);
        assert!(contrast.iter().all(|band| band.len() == spec.num_frames()));
    }
}
