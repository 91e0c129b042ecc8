use serde::Serialize;

use super::audit::AuditRow;
use super::classify::{ClassDecision, DrumLabel};
use super::grid::Boundary;
use super::pitch::PitchDecision;

/// Classification output for one grid cell.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassSegment {
    pub label: DrumLabel,
    /// Nominal grid start, 2 decimals
    pub start: f64,
    pub end: f64,
    /// Where the analyzed audio actually began, 4 decimals
    #[serde(rename = "adjustedStart")]
    pub adjusted_start: f64,
    /// kick, snare, hihat, noise; 6 decimals
    pub scores: [f64; 4],
}

/// Pitch output for one grid cell. `label` and `note` are both `rest` for rests.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PitchSegment {
    pub label: String,
    pub note: String,
    pub hz: f64,
    pub confidence: f64,
    pub confidence_rms: f64,
    pub rms: f64,
    pub start: f64,
    pub end: f64,
}

/// Decimal rounding with ties to even, so 0.125 becomes 0.12.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Pair each boundary with its decision; chunks without a decision become noise.
pub fn assemble_classification(
    boundaries: &[Boundary],
    decisions: &[Option<ClassDecision>],
) -> Vec<ClassSegment> {
    boundaries
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let decision = decisions
                .get(i)
                .copied()
                .flatten()
                .unwrap_or_else(ClassDecision::noise);
            ClassSegment {
                label: decision.label,
                start: round_to(b.nominal_start, 2),
                end: round_to(b.nominal_end, 2),
                adjusted_start: round_to(b.adjusted_start, 4),
                scores: decision.scores.map(|s| round_to(s as f64, 6)),
            }
        })
        .collect()
}

/// Pair each boundary with its decision; chunks without a decision become rests.
pub fn assemble_pitch(boundaries: &[Boundary], decisions: &[PitchDecision]) -> Vec<PitchSegment> {
    boundaries
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let start = round_to(b.nominal_start, 2);
            let end = round_to(b.nominal_end, 2);
            match decisions.get(i).cloned().unwrap_or_else(|| PitchDecision::empty(0.0)) {
                PitchDecision::Rest {
                    confidence,
                    confidence_rms,
                    rms,
                } => PitchSegment {
                    label: "rest".into(),
                    note: "rest".into(),
                    hz: 0.0,
                    confidence,
                    confidence_rms,
                    rms,
                    start,
                    end,
                },
                PitchDecision::Note {
                    name,
                    hz,
                    confidence,
                    confidence_rms,
                    rms,
                } => PitchSegment {
                    label: name.clone(),
                    note: name,
                    hz,
                    confidence,
                    confidence_rms,
                    rms,
                    start,
                    end,
                },
            }
        })
        .collect()
}

/// Audit rows mirror the segments exactly as returned.
pub fn audit_rows(segments: &[ClassSegment]) -> Vec<AuditRow> {
    segments
        .iter()
        .enumerate()
        .map(|(i, s)| AuditRow {
            chunk: i,
            start: s.start,
            end: s.end,
            scores: s.scores,
            label: s.label,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grid::{tempo_grid, TempoSpec};

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.1234567, 2), 0.12);
        assert_eq!(round_to(0.18000001, 4), 0.18);
        assert_eq!(round_to(0.98765432, 6), 0.987654);
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
    }

    #[test]
    fn missing_decisions_become_noise() {
        let grid = tempo_grid(&TempoSpec::classification(100.0, 1).unwrap()).unwrap();
        let decided = ClassDecision {
            label: DrumLabel::Kick,
            scores: [0.9, 0.05, 0.03, 0.02],
        };
        let segments = assemble_classification(&grid, &[Some(decided), None]);
        assert_eq!(segments.len(), 8);
        assert_eq!(segments[0].label, DrumLabel::Kick);
        assert_eq!(segments[1].label, DrumLabel::Noise);
        assert_eq!(segments[1].scores, [0.0, 0.0, 0.0, 1.0]);
        assert!(segments[2..].iter().all(|s| s.label == DrumLabel::Noise));
        assert_eq!(segments[1].start, 0.3);
        assert_eq!(segments[1].end, 0.6);
    }

    #[test]
    fn classification_json_shape() {
        let grid = tempo_grid(&TempoSpec::classification(120.0, 1).unwrap()).unwrap();
        let segments = assemble_classification(&grid[..1], &[None]);
        let json = serde_json::to_value(&segments[0]).unwrap();
        assert_eq!(json["label"], "noise");
        assert_eq!(json["adjustedStart"], 0.0);
        assert_eq!(json["scores"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn pitch_rest_and_note_segments() {
        let grid = tempo_grid(&TempoSpec::pitch(120.0, 1).unwrap()).unwrap();
        let decisions = vec![
            PitchDecision::empty(0.01),
            PitchDecision::Note {
                name: "A4".into(),
                hz: 440.0,
                confidence: 0.9,
                confidence_rms: 0.1,
                rms: 0.2,
            },
        ];
        let segments = assemble_pitch(&grid, &decisions);
        assert_eq!(segments.len(), 16);
        assert_eq!(segments[0].label, "rest");
        assert_eq!(segments[0].note, "rest");
        assert_eq!(segments[0].hz, 0.0);
        assert_eq!(segments[1].label, "A4");
        assert_eq!(segments[1].start, 0.12);
        assert_eq!(segments[1].end, 0.25);
        assert!(segments[2..].iter().all(|s| s.label == "rest"));
    }
}
