use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::descriptor::{Descriptor, DESCRIPTOR_LEN};

/// Softmax output over [kick, snare, hihat, noise].
pub type ClassScores = [f32; 4];

/// Scores of a chunk that never reached the model.
pub const NOISE_SCORES: ClassScores = [0.0, 0.0, 0.0, 1.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumLabel {
    Kick,
    Snare,
    Hihat,
    Noise,
}

impl DrumLabel {
    /// Model output order.
    pub const ALL: [DrumLabel; 4] = [DrumLabel::Kick, DrumLabel::Snare, DrumLabel::Hihat, DrumLabel::Noise];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrumLabel::Kick => "kick",
            DrumLabel::Snare => "snare",
            DrumLabel::Hihat => "hihat",
            DrumLabel::Noise => "noise",
        }
    }

    /// Label of the highest score, first one on ties.
    pub fn from_scores(scores: &ClassScores) -> Self {
        let mut best = 0;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best] {
                best = i;
            }
        }
        Self::ALL[best]
    }
}

/// Trained percussion classifier.
///
/// `predict` maps an N x 104 batch to N x 4 class probabilities, one row per
/// input row in the same order. Takes `&mut self`: implementations may keep
/// scratch state and are not assumed to be internally synchronized.
pub trait Classifier {
    fn predict(&mut self, batch: &[Vec<f32>]) -> Result<Vec<ClassScores>>;
}

/// What to do with chunks gated as silent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilencePolicy {
    /// Send the zero vector through the model, which was trained to call it noise
    #[default]
    Classify,
    /// Label silent chunks noise without invoking the model
    ShortCircuit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassDecision {
    pub label: DrumLabel,
    pub scores: ClassScores,
}

impl ClassDecision {
    pub fn noise() -> Self {
        Self {
            label: DrumLabel::Noise,
            scores: NOISE_SCORES,
        }
    }

    fn from_scores(scores: ClassScores) -> Self {
        Self {
            label: DrumLabel::from_scores(&scores),
            scores,
        }
    }
}

/// Classify a request's descriptors with a single batched model call.
pub fn reduce_descriptors(
    classifier: &mut dyn Classifier,
    descriptors: &[Descriptor],
    policy: SilencePolicy,
) -> Result<Vec<ClassDecision>> {
    let to_model: Vec<usize> = descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| policy == SilencePolicy::Classify || !d.is_silent())
        .map(|(i, _)| i)
        .collect();

    let mut decisions = vec![ClassDecision::noise(); descriptors.len()];
    if to_model.is_empty() {
        return Ok(decisions);
    }

    let batch: Vec<Vec<f32>> = to_model.iter().map(|&i| descriptors[i].to_vector()).collect();
    let scores = classifier.predict(&batch)?;
    anyhow::ensure!(
        scores.len() == batch.len(),
        "Classifier returned {} rows for a batch of {}",
        scores.len(),
        batch.len()
    );

    for (&i, row) in to_model.iter().zip(scores) {
        decisions[i] = ClassDecision::from_scores(row);
    }
    Ok(decisions)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Softmax,
    Linear,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DenseLayer {
    /// `weights[input][output]`
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.len()
    }

    fn outputs(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        out.extend_from_slice(&self.bias);
        for (x, row) in input.iter().zip(&self.weights) {
            for (o, w) in out.iter_mut().zip(row) {
                *o += x * w;
            }
        }
        match self.activation {
            Activation::Relu => out.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => softmax(out),
            Activation::Linear => {}
        }
    }
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        values.iter_mut().for_each(|v| *v /= sum);
    }
}

#[derive(Debug, Deserialize)]
struct DenseModelFile {
    layers: Vec<DenseLayer>,
}

/// Feed-forward network exported as JSON: `{"layers": [{"weights", "bias", "activation"}]}`.
#[derive(Debug)]
pub struct DenseClassifier {
    layers: Vec<DenseLayer>,
    scratch: (Vec<f32>, Vec<f32>),
}

impl DenseClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read classifier model: {}", path.display()))?;
        let model = Self::from_json(&content)
            .with_context(|| format!("Invalid classifier model: {}", path.display()))?;
        log::info!(
            "Loaded classifier {} ({} layers)",
            path.display(),
            model.layers.len()
        );
        Ok(model)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: DenseModelFile = serde_json::from_str(content).context("Malformed model JSON")?;
        Self::new(file.layers)
    }

    pub fn new(layers: Vec<DenseLayer>) -> Result<Self> {
        anyhow::ensure!(!layers.is_empty(), "Model has no layers");

        let mut width = DESCRIPTOR_LEN;
        for (i, layer) in layers.iter().enumerate() {
            anyhow::ensure!(
                layer.inputs() == width,
                "Layer {} expects {} inputs, previous width is {}",
                i,
                layer.inputs(),
                width
            );
            anyhow::ensure!(
                layer.weights.iter().all(|row| row.len() == layer.outputs()),
                "Layer {} weight rows do not match its {} biases",
                i,
                layer.outputs()
            );
            width = layer.outputs();
        }
        anyhow::ensure!(
            width == DrumLabel::ALL.len(),
            "Model produces {} outputs, expected {}",
            width,
            DrumLabel::ALL.len()
        );

        Ok(Self {
            layers,
            scratch: (Vec::new(), Vec::new()),
        })
    }
}

impl Classifier for DenseClassifier {
    fn predict(&mut self, batch: &[Vec<f32>]) -> Result<Vec<ClassScores>> {
        let (a, b) = &mut self.scratch;
        batch
            .iter()
            .enumerate()
            .map(|(row, input)| {
                anyhow::ensure!(
                    input.len() == DESCRIPTOR_LEN,
                    "Row {} has {} features, expected {}",
                    row,
                    input.len(),
                    DESCRIPTOR_LEN
                );
                a.clear();
                a.extend_from_slice(input);
                for layer in &self.layers {
                    layer.forward(a, b);
                    std::mem::swap(a, b);
                }
                Ok([a[0], a[1], a[2], a[3]])
            })
            .collect()
    }
}
