pub mod base;
pub mod encoder;
pub mod grid;
pub mod mention_pair;
pub mod ranking;
pub mod rerank;
pub mod stacking;

pub use base::BaseModel;
pub use encoder::Encoder;
pub use grid::GridModel;
pub use mention_pair::MentionPairModel;
pub use ranking::RankingModel;
pub use rerank::{build_rerank_samples, rerank_batches, RerankBatch, RerankModel, RerankSample};
pub use stacking::{stacking_batches, StackBatch, StackingModel, StackingSample};

use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::Linear;
use burn::tensor::activation::softmax;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use crate::config::ModelConfig;
use crate::data::{PasLabels, Sample};
use crate::decoder::RoleScores;
use crate::error::{PasaError, Result};
use crate::eval::Eval;

/// Vocabulary sizes a model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDims {
    pub n_vocab: usize,
    pub n_labels: usize,
}

/// Construction from configuration, used for fresh models and checkpoints.
pub trait Architecture<B: Backend>: Module<B> + Sized {
    fn init(config: &ModelConfig, dims: ModelDims, device: &B::Device) -> Self;
}

/// Loss and training-time counts of one step.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub eval: Eval,
}

/// A model that can be trained on batches of `Self::Batch`.
pub trait PasaModel<B: Backend>: Module<B> {
    type Batch;

    fn forward_step(&self, batch: &Self::Batch, labels: &PasLabels, device: &B::Device) -> Result<StepOutput<B>>;
}

/// Label distributions with the hidden states they were computed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelOutputs {
    /// `[prd][word][label]`
    pub probs: Vec<Vec<Vec<f32>>>,
    /// `[prd][word][dim_hidden]`
    pub hidden: Vec<Vec<Vec<f32>>>,
}

impl LabelOutputs {
    /// Softmax over the logits of `output` applied to `hidden`.
    pub(crate) fn from_hidden<B: Backend>(hidden: Tensor<B, 3>, output: &Linear<B>) -> Result<Self> {
        let [_, n_words, dim] = hidden.dims();
        let logits = output.forward(hidden.clone());
        let n_labels = logits.dims()[2];
        Ok(Self {
            probs: nest3(&to_vec(softmax(logits, 2))?, n_words, n_labels),
            hidden: nest3(&to_vec(hidden)?, n_words, dim),
        })
    }
}

/// Models producing a label distribution for every word of every predicate.
pub trait LabelScorer<B: Backend> {
    fn label_outputs(&self, sample: &Sample, device: &B::Device) -> Result<LabelOutputs>;

    /// `[prd][word][label]`
    fn label_probs(&self, sample: &Sample, device: &B::Device) -> Result<Vec<Vec<Vec<f32>>>> {
        Ok(self.label_outputs(sample, device)?.probs)
    }
}

/// Models scoring (case, word) decisions directly.
pub trait RoleScorer<B: Backend> {
    fn role_scores(&self, sample: &Sample, labels: &PasLabels, device: &B::Device) -> Result<Vec<RoleScores>>;
}

pub(crate) fn int_tensor<B: Backend, const D: usize>(
    ids: &[usize],
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D, Int> {
    let data: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
    Tensor::from_data(TensorData::new(data, shape), device)
}

pub(crate) fn float_tensor<B: Backend, const D: usize>(
    values: &[f32],
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(values.to_vec(), shape), device)
}

pub(crate) fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PasaError::TensorData(format!("{:?}", e)))
}

/// Row-wise argmax of a row-major `[rows, n]` matrix.
pub(crate) fn argmax_rows(values: &[f32], n: usize) -> Vec<usize> {
    values
        .chunks(n.max(1))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}

/// Splits a row-major `[a, b, c]` buffer into nested vectors.
pub(crate) fn nest3(values: &[f32], b: usize, c: usize) -> Vec<Vec<Vec<f32>>> {
    values
        .chunks(b * c)
        .map(|plane| plane.chunks(c).map(<[f32]>::to_vec).collect())
        .collect()
}

/// Cross-entropy over the last axis of `[rows, n, classes]` logits.
pub(crate) fn sequence_step<B: Backend>(
    logits: Tensor<B, 3>,
    gold: &[usize],
    labels: &PasLabels,
    device: &B::Device,
) -> Result<StepOutput<B>> {
    let [rows, n, classes] = logits.dims();
    if rows * n != gold.len() {
        return Err(PasaError::Shape(format!(
            "{} gold labels for logits {:?}",
            gold.len(),
            [rows, n, classes]
        )));
    }
    let logits = logits.reshape([rows * n, classes]);
    let targets = int_tensor::<B, 1>(gold, [rows * n], device);
    let loss = CrossEntropyLossConfig::new()
        .init(device)
        .forward(logits.clone(), targets);

    let sys = argmax_rows(&to_vec(logits.detach())?, classes);
    let mut eval = Eval::new();
    eval.update_labels(&sys, gold, labels);
    Ok(StepOutput { loss, eval })
}

/// Reverses a `[batch, time, dim]` tensor along time.
pub(crate) fn reverse_time<B: Backend>(tensor: Tensor<B, 3>) -> Tensor<B, 3> {
    let [_, time, _] = tensor.dims();
    let device = tensor.device();
    let order: Vec<usize> = (0..time).rev().collect();
    tensor.select(1, int_tensor::<B, 1>(&order, [time], &device))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_rows_picks_first_maximum() {
        let values = [0.1, 0.7, 0.2, 0.5, 0.5, 0.0];
        assert_eq!(argmax_rows(&values, 3), vec![1, 0]);
    }

    #[test]
    fn nest3_keeps_row_major_order() {
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let nested = nest3(&values, 2, 3);
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[1][0], vec![6.0, 7.0, 8.0]);
    }
}
