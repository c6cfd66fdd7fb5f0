use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Lstm};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use super::encoder::{alternating_lstm, lstm_stack};
use super::{float_tensor, sequence_step, Architecture, LabelOutputs, ModelDims, PasaModel, StepOutput};
use crate::config::ModelConfig;
use crate::data::{PasLabels, Sample};
use crate::error::{PasaError, Result};

/// A sentence whose word features are the hidden states and label
/// distributions an earlier model produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingSample {
    pub sent_index: usize,
    pub n_words: usize,
    pub prd_indices: Vec<usize>,
    /// `[prd][word][dim_hidden + n_labels]`
    pub x: Vec<Vec<Vec<f32>>>,
    /// `[prd][word]`
    pub y: Vec<Vec<usize>>,
}

impl StackingSample {
    /// Joins the gold labels of `sample` with the outputs computed for it.
    pub fn new(sample: &Sample, outputs: &LabelOutputs) -> Result<Self> {
        let n_prds = sample.n_prds();
        if outputs.probs.len() != n_prds || outputs.hidden.len() != n_prds {
            return Err(PasaError::Shape(format!(
                "sentence {}: outputs for {} predicates, expected {}",
                sample.sent_index,
                outputs.probs.len(),
                n_prds
            )));
        }

        let mut x = Vec::with_capacity(n_prds);
        let mut width = None;
        for (hidden, probs) in outputs.hidden.iter().zip(&outputs.probs) {
            if hidden.len() != sample.n_words || probs.len() != sample.n_words {
                return Err(PasaError::Shape(format!(
                    "sentence {}: outputs for {} words, expected {}",
                    sample.sent_index,
                    probs.len(),
                    sample.n_words
                )));
            }
            let mut rows = Vec::with_capacity(sample.n_words);
            for (h, p) in hidden.iter().zip(probs) {
                let row: Vec<f32> = h.iter().chain(p).copied().collect();
                if *width.get_or_insert(row.len()) != row.len() {
                    return Err(PasaError::Shape(format!(
                        "sentence {}: ragged output features",
                        sample.sent_index
                    )));
                }
                rows.push(row);
            }
            x.push(rows);
        }

        Ok(Self {
            sent_index: sample.sent_index,
            n_words: sample.n_words,
            prd_indices: sample.prd_indices.clone(),
            x,
            y: sample.y.clone(),
        })
    }

    pub fn n_prds(&self) -> usize {
        self.prd_indices.len()
    }

    /// Width of the per-word features; 0 without predicates.
    pub fn n_input(&self) -> usize {
        self.x.first().and_then(|prd| prd.first()).map_or(0, Vec::len)
    }
}

/// Predicate rows of equal sentence length.
#[derive(Debug, Clone)]
pub struct StackBatch {
    pub n_rows: usize,
    pub n_words: usize,
    pub n_input: usize,
    /// `[n_rows, n_words, n_input]`
    pub x: Vec<f32>,
    /// `[n_rows, n_words]`
    pub y: Vec<usize>,
}

impl StackBatch {
    fn from_rows(samples: &[StackingSample], rows: &[(usize, usize)]) -> Self {
        let first = &samples[rows[0].0];
        let mut batch = StackBatch {
            n_rows: rows.len(),
            n_words: first.n_words,
            n_input: first.n_input(),
            x: Vec::new(),
            y: Vec::new(),
        };
        for &(s, p) in rows {
            batch.x.extend(samples[s].x[p].iter().flatten());
            batch.y.extend_from_slice(&samples[s].y[p]);
        }
        batch
    }

    pub fn from_sample(sample: &StackingSample) -> Self {
        let rows: Vec<(usize, usize)> = (0..sample.n_prds()).map(|p| (0, p)).collect();
        Self::from_rows(std::slice::from_ref(sample), &rows)
    }
}

pub fn stacking_batches(samples: &[StackingSample], batch_size: usize) -> Vec<StackBatch> {
    let mut rows: Vec<(usize, usize)> = samples
        .iter()
        .enumerate()
        .flat_map(|(s, sample)| (0..sample.n_prds()).map(move |p| (s, p)))
        .collect();
    rows.sort_by_key(|&(s, _)| samples[s].n_words);

    let mut batches = Vec::new();
    for group in rows.chunk_by(|a, b| samples[a.0].n_words == samples[b.0].n_words) {
        for chunk in group.chunks(batch_size.max(1)) {
            batches.push(StackBatch::from_rows(samples, chunk));
        }
    }
    batches
}

/// Alternating-direction LSTMs over the outputs of an earlier model.
#[derive(Module, Debug)]
pub struct StackingModel<B: Backend> {
    layers: Vec<Lstm<B>>,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> Architecture<B> for StackingModel<B> {
    fn init(config: &ModelConfig, dims: ModelDims, device: &B::Device) -> Self {
        Self {
            layers: lstm_stack(config, config.stack_input, device),
            dropout: DropoutConfig::new(config.dropout).init(),
            output: LinearConfig::new(config.dim_hidden, dims.n_labels).init(device),
        }
    }
}

impl<B: Backend> StackingModel<B> {
    /// `x: [rows, n_words, n_input]` -> label logits `[rows, n_words, n_labels]`.
    pub fn forward(&self, x: Tensor<B, 3>, train: bool) -> Tensor<B, 3> {
        self.output.forward(alternating_lstm(&self.layers, &self.dropout, x, train))
    }

    fn encode_batch(&self, batch: &StackBatch, train: bool, device: &B::Device) -> Tensor<B, 3> {
        let x = float_tensor::<B, 3>(&batch.x, [batch.n_rows, batch.n_words, batch.n_input], device);
        alternating_lstm(&self.layers, &self.dropout, x, train)
    }

    /// Label distributions and hidden states for every predicate of `sample`.
    pub fn stack_outputs(&self, sample: &StackingSample, device: &B::Device) -> Result<LabelOutputs> {
        if sample.n_prds() == 0 {
            return Ok(LabelOutputs::default());
        }
        let hidden = self.encode_batch(&StackBatch::from_sample(sample), false, device);
        LabelOutputs::from_hidden(hidden, &self.output)
    }
}

impl<B: Backend> PasaModel<B> for StackingModel<B> {
    type Batch = StackBatch;

    fn forward_step(&self, batch: &StackBatch, labels: &PasLabels, device: &B::Device) -> Result<StepOutput<B>> {
        let logits = self.output.forward(self.encode_batch(batch, true, device));
        sequence_step(logits, &batch.y, labels, device)
    }
}
