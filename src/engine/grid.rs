use crate::error::{EngineError, EngineResult};

/// Chunks per bar for the percussion classifier.
pub const CLASSIFICATION_PARTITIONS: u32 = 8;
/// Chunks per bar for pitch analysis.
pub const PITCH_PARTITIONS: u32 = 16;
/// Longest accepted performance, in bars.
pub const MAX_BARS: u32 = 10_000;

/// Musical tempo and the grid it is cut into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoSpec {
    pub tempo_bpm: f64,
    pub bar_count: u32,
    pub partitions_per_bar: u32,
}

impl TempoSpec {
    pub fn new(tempo_bpm: f64, bar_count: u32, partitions_per_bar: u32) -> EngineResult<Self> {
        let spec = Self {
            tempo_bpm,
            bar_count,
            partitions_per_bar,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Eighth-note grid used by the classification pipeline.
    pub fn classification(tempo_bpm: f64, bar_count: u32) -> EngineResult<Self> {
        Self::new(tempo_bpm, bar_count, CLASSIFICATION_PARTITIONS)
    }

    /// Sixteenth-note grid used by the pitch pipeline.
    pub fn pitch(tempo_bpm: f64, bar_count: u32) -> EngineResult<Self> {
        Self::new(tempo_bpm, bar_count, PITCH_PARTITIONS)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "Tempo must be positive, got {}",
                self.tempo_bpm
            )));
        }
        if self.bar_count == 0 {
            return Err(EngineError::InvalidInput("Bar count must be at least 1".into()));
        }
        if self.bar_count > MAX_BARS {
            return Err(EngineError::InvalidInput(format!(
                "Bar count {} exceeds the maximum of {}",
                self.bar_count, MAX_BARS
            )));
        }
        if self.partitions_per_bar != CLASSIFICATION_PARTITIONS
            && self.partitions_per_bar != PITCH_PARTITIONS
        {
            return Err(EngineError::InvalidInput(format!(
                "Unsupported partition count {} (expected {} or {})",
                self.partitions_per_bar, CLASSIFICATION_PARTITIONS, PITCH_PARTITIONS
            )));
        }
        Ok(())
    }

    /// Four beats per bar.
    pub fn total_duration(&self) -> f64 {
        60.0 / self.tempo_bpm * 4.0 * self.bar_count as f64
    }

    pub fn chunk_count(&self) -> usize {
        self.partitions_per_bar as usize * self.bar_count as usize
    }

    pub fn chunk_duration(&self) -> f64 {
        self.total_duration() / self.chunk_count() as f64
    }
}

/// One grid cell, before and after snapping. Times in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Boundary {
    pub index: usize,
    pub nominal_start: f64,
    pub nominal_end: f64,
    pub adjusted_start: f64,
    pub adjusted_end: f64,
}

impl Boundary {
    pub fn duration(&self) -> f64 {
        self.nominal_end - self.nominal_start
    }

    /// Move the analysis window by `shift` seconds, never before zero.
    pub fn shifted(self, shift: f64) -> Self {
        let adjusted_start = (self.nominal_start + shift).max(0.0);
        Self {
            adjusted_start,
            adjusted_end: adjusted_start + self.duration(),
            ..self
        }
    }
}

/// Nominal boundaries of every chunk, in order. Cell `i` spans
/// `[i * d, (i + 1) * d)` so neighbours share their edge exactly.
pub fn tempo_grid(spec: &TempoSpec) -> EngineResult<Vec<Boundary>> {
    spec.validate()?;
    let d = spec.chunk_duration();
    Ok((0..spec.chunk_count())
        .map(|i| {
            let start = i as f64 * d;
            let end = (i + 1) as f64 * d;
            Boundary {
                index: i,
                nominal_start: start,
                nominal_end: end,
                adjusted_start: start,
                adjusted_end: end,
            }
        })
        .collect())
}
