//! Tempo-grid segmentation and per-segment scoring.
//!
//! Both entry points cut a recording into the cells of a [`TempoSpec`] and
//! return exactly one segment per cell, in order. Silent or unusable chunks
//! become `noise` / `rest` placeholders rather than errors.

pub mod audit;
pub mod capability;
pub mod chunk;
pub mod classify;
pub mod descriptor;
pub mod grid;
pub mod pitch;
pub mod segment;
pub mod snap;

use rayon::prelude::*;
use serde::Deserialize;
use std::sync::Mutex;

pub use audit::{AuditRow, AuditSink, CsvAuditLog, MemoryAudit, NullAudit};
pub use capability::{OnsetDetector, PitchTracker};
pub use classify::{
    ClassDecision, ClassScores, Classifier, DenseClassifier, DrumLabel, SilencePolicy,
};
pub use descriptor::{Descriptor, DescriptorBuilder, DESCRIPTOR_LEN};
pub use grid::{tempo_grid, Boundary, TempoSpec};
pub use pitch::{PitchDecision, PitchPolicy};
pub use segment::{ClassSegment, PitchSegment};

use crate::audio::{rms, Waveform, ENGINE_SAMPLE_RATE};
use crate::error::{EngineError, EngineResult};

/// External collaborators, constructed once and shared across requests.
///
/// The pitch tracker, classifier and audit sink are not assumed to be
/// thread-safe, so each sits behind its own lock and concurrent requests
/// take turns on them.
pub struct Capabilities {
    onsets: Box<dyn OnsetDetector + Send + Sync>,
    pitch: Mutex<Box<dyn PitchTracker + Send>>,
    classifier: Option<Mutex<Box<dyn Classifier + Send>>>,
    audit: Mutex<Box<dyn AuditSink + Send>>,
}

impl Capabilities {
    /// No classifier and a discarding audit sink; pitch analysis only.
    pub fn new(
        onsets: impl OnsetDetector + Send + Sync + 'static,
        pitch: impl PitchTracker + Send + 'static,
    ) -> Self {
        Self {
            onsets: Box::new(onsets),
            pitch: Mutex::new(Box::new(pitch)),
            classifier: None,
            audit: Mutex::new(Box::new(NullAudit)),
        }
    }

    pub fn with_classifier(mut self, classifier: impl Classifier + Send + 'static) -> Self {
        self.classifier = Some(Mutex::new(Box::new(classifier)));
        self
    }

    pub fn with_audit(mut self, audit: impl AuditSink + Send + 'static) -> Self {
        self.audit = Mutex::new(Box::new(audit));
        self
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }
}

/// Knobs of the classification pipeline.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifyPolicy {
    /// Chunks quieter than this skip the spectral pipeline
    pub silence_rms: f32,
    /// Tail of every chunk dropped before description
    pub trim_fraction: f64,
    /// Shorter chunks become noise without a model call
    pub min_chunk_samples: usize,
    /// Look-back window as a fraction of the chunk duration
    pub snap_window_fraction: f64,
    pub silence_policy: SilencePolicy,
}

impl Default for ClassifyPolicy {
    fn default() -> Self {
        Self {
            silence_rms: 0.05,
            trim_fraction: 0.1,
            min_chunk_samples: 1,
            snap_window_fraction: 0.5,
            silence_policy: SilencePolicy::default(),
        }
    }
}

pub struct Engine {
    caps: Capabilities,
    pub classify: ClassifyPolicy,
    pub pitch: PitchPolicy,
}

impl Engine {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            classify: ClassifyPolicy::default(),
            pitch: PitchPolicy::default(),
        }
    }

    pub fn with_policies(mut self, classify: ClassifyPolicy, pitch: PitchPolicy) -> Self {
        self.classify = classify;
        self.pitch = pitch;
        self
    }

    /// Label every eighth-note cell of the grid as kick, snare, hihat or noise.
    ///
    /// Boundaries are snapped back to the latest onset within half a chunk,
    /// each chunk is described (in parallel) and the whole request is
    /// classified as one batch. Every row is appended to the audit sink.
    pub fn segment_for_classification(
        &self,
        waveform: &Waveform,
        spec: &TempoSpec,
    ) -> EngineResult<Vec<ClassSegment>> {
        check_waveform(waveform)?;
        let grid = tempo_grid(spec)?;
        let classifier = self
            .caps
            .classifier
            .as_ref()
            .ok_or_else(|| EngineError::capability("classifier", anyhow::anyhow!("no model loaded")))?;

        let chunk_duration = spec.chunk_duration();
        log::info!(
            "Classifying {} chunks of {:.3}s ({:.1} BPM, {} bars)",
            grid.len(),
            chunk_duration,
            spec.tempo_bpm,
            spec.bar_count
        );

        let onsets = self
            .caps
            .onsets
            .detect_onsets(waveform)
            .map_err(|e| EngineError::capability("onset detector", e))?;
        log::debug!("Detected {} onsets", onsets.len());
        let onsets = snap::fit_onsets(onsets, grid.len() + 1, waveform.duration());

        let window = chunk_duration * self.classify.snap_window_fraction;
        let snapped: Vec<Boundary> = grid
            .iter()
            .map(|b| snap::snap_to_onset(*b, window, &onsets))
            .collect();

        let builder = DescriptorBuilder::new(waveform.sample_rate(), self.classify.silence_rms);
        let described: Vec<Option<Descriptor>> = snapped
            .par_iter()
            .map(|b| {
                chunk::classification_chunk(
                    waveform,
                    b,
                    self.classify.trim_fraction,
                    self.classify.min_chunk_samples,
                )
                .map(|samples| builder.build(samples))
            })
            .collect();

        let present: Vec<Descriptor> = described.iter().flatten().cloned().collect();
        let reduced = {
            let mut model = classifier
                .lock()
                .map_err(|_| EngineError::capability("classifier", anyhow::anyhow!("lock poisoned")))?;
            classify::reduce_descriptors(&mut **model, &present, self.classify.silence_policy)
                .map_err(|e| EngineError::capability("classifier", e))?
        };

        let mut reduced = reduced.into_iter();
        let decisions: Vec<Option<ClassDecision>> = described
            .iter()
            .map(|d| d.as_ref().and_then(|_| reduced.next()))
            .collect();

        let segments = segment::assemble_classification(&snapped, &decisions);
        for (b, s) in snapped.iter().zip(&segments) {
            log::debug!(
                "chunk {}: {:.4}-{:.4}s -> {} {:?}",
                b.index,
                b.adjusted_start,
                b.adjusted_end,
                s.label.as_str(),
                s.scores
            );
        }

        let rows = segment::audit_rows(&segments);
        self.caps
            .audit
            .lock()
            .map_err(|_| EngineError::capability("audit log", anyhow::anyhow!("lock poisoned")))?
            .append(&rows)
            .map_err(|e| EngineError::capability("audit log", e))?;

        Ok(segments)
    }

    /// Estimate one note (or rest) per sixteenth-note cell of the grid.
    pub fn segment_for_pitch(
        &self,
        waveform: &Waveform,
        spec: &TempoSpec,
    ) -> EngineResult<Vec<PitchSegment>> {
        check_waveform(waveform)?;
        let grid = tempo_grid(spec)?;

        let track = self
            .caps
            .pitch
            .lock()
            .map_err(|_| EngineError::capability("pitch tracker", anyhow::anyhow!("lock poisoned")))?
            .track_pitch(waveform)
            .map_err(|e| EngineError::capability("pitch tracker", e))?;

        if !(track.frame_rate.is_finite() && track.frame_rate > 0.0) {
            return Err(EngineError::capability(
                "pitch tracker",
                anyhow::anyhow!("invalid frame rate {}", track.frame_rate),
            ));
        }

        let layout = self.pitch.frame_layout(track.frame_rate, spec.chunk_duration());
        log::info!(
            "Pitch analysis of {} chunks, {} frames each ({} frames tracked)",
            grid.len(),
            layout.frames_per_chunk,
            track.frames.len()
        );

        let confidence = track.confidences();
        let decisions: Vec<PitchDecision> = grid
            .iter()
            .map(|b| {
                let window = layout.peak_window(b, &confidence);
                let loudness = rms(chunk::loudness_window(waveform, b, self.pitch.rms_margin));
                let decision = pitch::decide(&track.frames, &window, loudness, &self.pitch);
                log::debug!(
                    "chunk {}: frames {:?}{} -> {:?}",
                    b.index,
                    window.frames,
                    if window.shifted { " (shifted)" } else { "" },
                    decision
                );
                decision
            })
            .collect();

        Ok(segment::assemble_pitch(&grid, &decisions))
    }
}

fn check_waveform(waveform: &Waveform) -> EngineResult<()> {
    if waveform.is_empty() {
        return Err(EngineError::InvalidInput("Waveform is empty".into()));
    }
    if waveform.sample_rate() != ENGINE_SAMPLE_RATE {
        return Err(EngineError::InvalidInput(format!(
            "Waveform must be {} Hz, got {} Hz",
            ENGINE_SAMPLE_RATE,
            waveform.sample_rate()
        )));
    }
    Ok(())
}
