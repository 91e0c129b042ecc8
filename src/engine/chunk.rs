use super::grid::Boundary;
use crate::audio::Waveform;

/// Audio of one classification chunk, or nothing when it is too short to describe.
///
/// The slice covers the snapped window minus its last `trim_fraction`, which
/// keeps the attack of the following hit out of this chunk.
pub fn classification_chunk<'a>(
    waveform: &'a Waveform,
    boundary: &Boundary,
    trim_fraction: f64,
    min_samples: usize,
) -> Option<&'a [f32]> {
    let slice = waveform.slice_seconds(boundary.adjusted_start, boundary.adjusted_end);
    let keep = (slice.len() as f64 * (1.0 - trim_fraction)) as usize;
    let chunk = &slice[..keep.min(slice.len())];
    if chunk.is_empty() || chunk.len() < min_samples {
        return None;
    }
    Some(chunk)
}

/// Audio used to measure a pitch chunk's loudness: the nominal window widened
/// by `margin` seconds on both sides.
pub fn loudness_window<'a>(waveform: &'a Waveform, boundary: &Boundary, margin: f64) -> &'a [f32] {
    waveform.slice_seconds(
        (boundary.nominal_start - margin).max(0.0),
        boundary.nominal_end + margin,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ENGINE_SAMPLE_RATE;
    use crate::engine::grid::{tempo_grid, TempoSpec};

    fn ramp(seconds: f64) -> Waveform {
        let n = (seconds * ENGINE_SAMPLE_RATE as f64) as usize;
        Waveform::new((0..n).map(|i| i as f32).collect(), ENGINE_SAMPLE_RATE)
    }

    #[test]
    fn trims_the_tail() {
        let wf = ramp(2.0);
        let grid = tempo_grid(&TempoSpec::classification(120.0, 1).unwrap()).unwrap();
        let chunk = classification_chunk(&wf, &grid[1], 0.1, 1).unwrap();
        assert_eq!(chunk.len(), 3600);
        assert_eq!(chunk[0], 4000.0);
        assert_eq!(*chunk.last().unwrap(), 7599.0);
    }

    #[test]
    fn chunk_past_the_end_is_none() {
        let wf = ramp(0.5);
        let grid = tempo_grid(&TempoSpec::classification(120.0, 1).unwrap()).unwrap();
        assert!(classification_chunk(&wf, &grid[3], 0.1, 1).is_none());
        assert!(classification_chunk(&wf, &grid[1], 0.1, 4000).is_none());
    }

    #[test]
    fn loudness_window_adds_margin() {
        let wf = ramp(2.0);
        let grid = tempo_grid(&TempoSpec::pitch(120.0, 1).unwrap()).unwrap();
        // 0.125 s chunks; first window clamps at zero
        assert_eq!(loudness_window(&wf, &grid[0], 0.05).len(), 2800);
        let second = loudness_window(&wf, &grid[1], 0.05);
        assert_eq!(second.len(), 3600);
        assert_eq!(second[0], 1200.0);
    }
}
