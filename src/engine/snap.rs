//! Boundary snapping.
//!
//! Performers tend to land slightly ahead of the grid. The classification
//! pipeline therefore looks back from each nominal boundary for the latest
//! onset; the pitch pipeline instead nudges its frame window earlier when the
//! strongest frame sits right at the head of the chunk.

use std::ops::Range;

use super::grid::Boundary;

/// Sort onsets, then pad with `fill` or truncate so exactly `count` remain.
pub fn fit_onsets(mut onsets: Vec<f64>, count: usize, fill: f64) -> Vec<f64> {
    onsets.retain(|t| t.is_finite());
    onsets.sort_by(|a, b| a.total_cmp(b));
    onsets.resize(count, fill);
    onsets
}

/// Shift that moves `nominal_start` onto the latest onset in
/// `[max(0, nominal_start - window), nominal_start)`, or 0.0 if there is none.
pub fn look_back_shift(nominal_start: f64, window: f64, onsets: &[f64]) -> f64 {
    let search_start = (nominal_start - window).max(0.0);
    onsets
        .iter()
        .copied()
        .filter(|&t| search_start <= t && t < nominal_start)
        .reduce(f64::max)
        .map_or(0.0, |onset| onset - nominal_start)
}

/// Snap one boundary to the latest preceding onset within `window` seconds.
pub fn snap_to_onset(boundary: Boundary, window: f64, onsets: &[f64]) -> Boundary {
    let shift = look_back_shift(boundary.nominal_start, window, onsets);
    boundary.shifted(shift)
}

/// Frame window of one pitch chunk after the head-peak correction.
#[derive(Clone, Debug, PartialEq)]
pub struct PeakWindow {
    /// Frames analyzed for this chunk, head frames already skipped
    pub frames: Range<usize>,
    /// Offset of the highest-confidence frame within `frames`
    pub peak: Option<usize>,
    pub shifted: bool,
}

/// Frame geometry shared by every chunk of a pitch request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameLayout {
    /// Pitch frames per second
    pub frame_rate: f64,
    pub frames_per_chunk: usize,
    /// Head frames dropped from every chunk
    pub skip: usize,
    /// A peak before this offset triggers the early shift, which is also the shift size
    pub early: usize,
}

impl FrameLayout {
    pub fn new(frame_rate: f64, chunk_duration: f64, skip_fraction: f64, early_fraction: f64) -> Self {
        let frames_per_chunk = (frame_rate * chunk_duration) as usize;
        Self {
            frame_rate,
            frames_per_chunk,
            skip: (frames_per_chunk as f64 * skip_fraction) as usize,
            early: (frames_per_chunk as f64 * early_fraction) as usize,
        }
    }

    /// Locate the analysis window of one grid cell. The window spans the
    /// frames nearest the cell's nominal edges, so it stays on the grid for
    /// any tempo. When the peak confidence falls in the first `early` frames
    /// (never for the first cell), the window is moved earlier by `early`
    /// frames once and the peak is found again.
    pub fn peak_window(&self, boundary: &Boundary, confidence: &[f32]) -> PeakWindow {
        let start = self.frame_at(boundary.nominal_start);
        let end = self.frame_at(boundary.nominal_end).max(start);

        let frames = clamp_range(start + self.skip, end, confidence.len());
        let peak = arg_max(&confidence[frames.clone()]);

        match peak {
            Some(p) if p < self.early && boundary.index > 0 => {
                let start = start.saturating_sub(self.early);
                let end = end.saturating_sub(self.early);
                let frames = clamp_range(start + self.skip, end, confidence.len());
                let peak = arg_max(&confidence[frames.clone()]);
                PeakWindow {
                    frames,
                    peak,
                    shifted: true,
                }
            }
            _ => PeakWindow {
                frames,
                peak,
                shifted: false,
            },
        }
    }
}

impl FrameLayout {
    fn frame_at(&self, seconds: f64) -> usize {
        (seconds * self.frame_rate).round().max(0.0) as usize
    }
}

fn clamp_range(start: usize, end: usize, len: usize) -> Range<usize> {
    let end = end.min(len);
    start.min(end)..end
}

/// Index of the first maximum.
pub fn arg_max(values: &[f32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if best.map_or(true, |b| *v > values[b]) {
            best = Some(i);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grid::{tempo_grid, TempoSpec};

    #[test]
    fn onset_inside_window_snaps_boundary() {
        let spec = TempoSpec::classification(120.0, 1).unwrap();
        let grid = tempo_grid(&spec).unwrap();
        let snapped = snap_to_onset(grid[1], 0.125, &[0.18]);
        assert!((snapped.adjusted_start - 0.18).abs() < 1e-12);
        assert!((snapped.adjusted_end - 0.43).abs() < 1e-12);
        assert_eq!(snapped.nominal_start, 0.25);
    }

    #[test]
    fn window_is_half_open() {
        // lower edge included, boundary itself excluded
        assert_eq!(look_back_shift(0.25, 0.125, &[0.125]), 0.125 - 0.25);
        assert_eq!(look_back_shift(0.25, 0.125, &[0.25]), 0.0);
        assert_eq!(look_back_shift(0.25, 0.125, &[0.1]), 0.0);
        assert_eq!(look_back_shift(0.25, 0.125, &[]), 0.0);
    }

    #[test]
    fn latest_candidate_wins() {
        let shift = look_back_shift(1.0, 0.5, &[0.6, 0.9, 0.7, 1.2]);
        assert!((shift - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn never_snaps_before_zero() {
        let spec = TempoSpec::classification(120.0, 1).unwrap();
        let first = tempo_grid(&spec).unwrap()[0];
        let snapped = snap_to_onset(first, 0.125, &[0.0, 0.01]);
        assert_eq!(snapped.adjusted_start, 0.0);
    }

    #[test]
    fn fit_onsets_pads_and_truncates() {
        assert_eq!(fit_onsets(vec![0.5, 0.1], 4, 2.0), vec![0.1, 0.5, 2.0, 2.0]);
        assert_eq!(fit_onsets(vec![0.1, 0.2, 0.3], 2, 9.0), vec![0.1, 0.2]);
    }

    fn cell(index: usize, duration: f64) -> Boundary {
        let start = index as f64 * duration;
        let end = (index + 1) as f64 * duration;
        Boundary {
            index,
            nominal_start: start,
            nominal_end: end,
            adjusted_start: start,
            adjusted_end: end,
        }
    }

    #[test]
    fn head_peak_shifts_window_once() {
        // 10 frames per chunk, skip 1, early 2
        let layout = FrameLayout::new(100.0, 0.1, 0.1, 0.2);
        assert_eq!(
            layout,
            FrameLayout { frame_rate: 100.0, frames_per_chunk: 10, skip: 1, early: 2 }
        );

        let mut conf = vec![0.1f32; 30];
        conf[11] = 0.9; // first analyzed frame of chunk 1
        conf[8] = 0.95;
        let window = layout.peak_window(&cell(1, 0.1), &conf);
        assert!(window.shifted);
        assert_eq!(window.frames, 9..18);
        // peak is re-derived inside the moved window
        assert_eq!(window.peak, Some(2));
    }

    #[test]
    fn first_chunk_is_never_shifted() {
        let layout = FrameLayout::new(100.0, 0.1, 0.1, 0.2);
        let mut conf = vec![0.1f32; 30];
        conf[1] = 0.9;
        let window = layout.peak_window(&cell(0, 0.1), &conf);
        assert!(!window.shifted);
        assert_eq!(window.frames, 1..10);
        assert_eq!(window.peak, Some(0));
    }

    #[test]
    fn window_past_the_track_is_empty() {
        let layout = FrameLayout::new(100.0, 0.1, 0.1, 0.2);
        let window = layout.peak_window(&cell(5, 0.1), &[0.5; 20]);
        assert!(window.frames.is_empty());
        assert_eq!(window.peak, None);
    }

    #[test]
    fn windows_follow_the_grid_with_fractional_frame_counts() {
        // 120 BPM sixteenths: 12.5 frames per cell at 100 frames/s
        let layout = FrameLayout::new(100.0, 0.125, 0.1, 0.2);
        assert_eq!(layout.frames_per_chunk, 12);

        let conf = vec![0.1f32; 801];
        let last = layout.peak_window(&cell(63, 0.125), &conf);
        // cell 63 spans 7.875-8.0 s, frames 788..800 with one skipped head frame
        assert!(last.shifted);
        assert_eq!(last.frames, 787..798);

        let mut conf = vec![0.1f32; 801];
        conf[795] = 0.9;
        let window = layout.peak_window(&cell(63, 0.125), &conf);
        assert!(!window.shifted);
        assert_eq!(window.frames, 789..800);
        assert_eq!(window.peak, Some(6));
    }

    #[test]
    fn arg_max_prefers_first() {
        assert_eq!(arg_max(&[0.2, 0.7, 0.7]), Some(1));
        assert_eq!(arg_max(&[]), None);
    }
}
