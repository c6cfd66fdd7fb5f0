use burn::module::{Module, Param};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::softmax;
use burn::tensor::{backend::Backend, Int, Tensor};

use super::{argmax_rows, int_tensor, to_vec, Architecture, Encoder, ModelDims, PasaModel, RoleScorer, StepOutput};
use crate::config::ModelConfig;
use crate::data::{Case, PasLabels, Sample, SeqBatch};
use crate::decoder::RoleScores;
use crate::error::Result;
use crate::eval::Eval;

/// For every predicate and case, a softmax over the words of the sentence
/// plus one null slot.
#[derive(Module, Debug)]
pub struct RankingModel<B: Backend> {
    encoder: Encoder<B>,
    scorer: Linear<B>,
    null: Param<Tensor<B, 1>>,
}

impl<B: Backend> Architecture<B> for RankingModel<B> {
    fn init(config: &ModelConfig, dims: ModelDims, device: &B::Device) -> Self {
        Self {
            encoder: Encoder::new(config, dims.n_vocab, device),
            scorer: LinearConfig::new(config.dim_hidden, Case::ALL.len()).init(device),
            null: Param::from_tensor(Tensor::zeros([Case::ALL.len()], device)),
        }
    }
}

impl<B: Backend> RankingModel<B> {
    /// Slot scores `[rows, 3, n_words + 1]`; the last slot is null.
    pub fn forward(&self, x_w: Tensor<B, 3, Int>, x_p: Tensor<B, 2, Int>, train: bool) -> Tensor<B, 3> {
        let hidden = self.encoder.forward(x_w, x_p, train);
        let [rows, _, _] = hidden.dims();
        let n_cases = Case::ALL.len();
        let words = self.scorer.forward(hidden).swap_dims(1, 2);
        let null = self.null.val().reshape([1, n_cases, 1]).repeat_dim(0, rows);
        Tensor::cat(vec![words, null], 2)
    }

    fn forward_batch(&self, batch: &SeqBatch, train: bool, device: &B::Device) -> Tensor<B, 3> {
        let x_w = int_tensor::<B, 3>(&batch.x_w, [batch.n_rows, batch.n_words, batch.n_features], device);
        let x_p = int_tensor::<B, 2>(&batch.x_p, [batch.n_rows, batch.n_words], device);
        self.forward(x_w, x_p, train)
    }
}

/// Gold slot per (row, case): the word holding the case, or `n_words`.
fn gold_slots(y: &[usize], n_words: usize, labels: &PasLabels) -> Vec<usize> {
    y.chunks(n_words.max(1))
        .flat_map(|row| {
            Case::ALL.map(|case| {
                let id = labels.case_id(case);
                row.iter().position(|&l| l == id).unwrap_or(n_words)
            })
        })
        .collect()
}

impl<B: Backend> PasaModel<B> for RankingModel<B> {
    type Batch = SeqBatch;

    fn forward_step(&self, batch: &SeqBatch, labels: &PasLabels, device: &B::Device) -> Result<StepOutput<B>> {
        let scores = self.forward_batch(batch, true, device);
        let [rows, n_cases, n_slots] = scores.dims();
        let scores = scores.reshape([rows * n_cases, n_slots]);

        let gold = gold_slots(&batch.y, batch.n_words, labels);
        let targets = int_tensor::<B, 1>(&gold, [rows * n_cases], device);
        let loss = CrossEntropyLossConfig::new()
            .init(device)
            .forward(scores.clone(), targets);

        let sys = argmax_rows(&to_vec(scores.detach())?, n_slots);
        let mut eval = Eval::new();
        eval.update_slots(&sys, &gold, batch.n_words);
        Ok(StepOutput { loss, eval })
    }
}

impl<B: Backend> RoleScorer<B> for RankingModel<B> {
    fn role_scores(&self, sample: &Sample, _labels: &PasLabels, device: &B::Device) -> Result<Vec<RoleScores>> {
        if sample.n_prds() == 0 {
            return Ok(Vec::new());
        }
        let batch = SeqBatch::from_sample(sample);
        let probs = to_vec(softmax(self.forward_batch(&batch, false, device), 2))?;
        let n_slots = sample.n_words + 1;

        let roles = probs
            .chunks(Case::ALL.len() * n_slots)
            .map(|row| {
                let slot = |c: usize| &row[c * n_slots..(c + 1) * n_slots];
                RoleScores {
                    scores: [0, 1, 2].map(|c| slot(c)[..sample.n_words].to_vec()),
                    null: [0, 1, 2].map(|c| slot(c)[sample.n_words]),
                }
            })
            .collect();
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Vocab;

    #[test]
    fn gold_slots_point_at_case_words_or_null() {
        let labels = PasLabels::from_vocab(&Vocab::pas_labels()).unwrap();
        // NA GA O NI PRD = 0 1 2 3 4
        let y = [1, 4, 0, 0, 2, 4];
        assert_eq!(gold_slots(&y, 3, &labels), vec![0, 3, 3, 3, 1, 3]);
    }
}
