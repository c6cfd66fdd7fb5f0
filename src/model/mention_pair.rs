use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::activation::softmax;
use burn::tensor::{backend::Backend, Int, Tensor};

use super::encoder::N_MARKS;
use super::{argmax_rows, int_tensor, to_vec, Architecture, ModelDims, PasaModel, RoleScorer, StepOutput};
use crate::config::ModelConfig;
use crate::data::{Case, PairBatch, PairSample, PasLabels, Sample};
use crate::decoder::RoleScores;
use crate::error::Result;
use crate::eval::Eval;

/// Probability a pair must exceed to fill its case.
const PAIR_THRESHOLD: f32 = 0.5;

/// Classifies (predicate, word, case) triples independently.
#[derive(Module, Debug)]
pub struct MentionPairModel<B: Backend> {
    word_embed: Embedding<B>,
    posit_embed: Embedding<B>,
    case_embed: Embedding<B>,
    hidden: Linear<B>,
    output: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> Architecture<B> for MentionPairModel<B> {
    fn init(config: &ModelConfig, dims: ModelDims, device: &B::Device) -> Self {
        let d_input = config.dim_emb * config.n_features() + 2 * config.dim_posit;
        Self {
            word_embed: EmbeddingConfig::new(dims.n_vocab, config.dim_emb).init(device),
            posit_embed: EmbeddingConfig::new(N_MARKS, config.dim_posit).init(device),
            case_embed: EmbeddingConfig::new(Case::ALL.len(), config.dim_posit).init(device),
            hidden: LinearConfig::new(d_input, config.dim_hidden).init(device),
            output: LinearConfig::new(config.dim_hidden, 2).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }
}

impl<B: Backend> MentionPairModel<B> {
    /// Two-way logits `[rows, 2]`.
    pub fn forward(
        &self,
        x: Tensor<B, 2, Int>,
        mark: Tensor<B, 1, Int>,
        case: Tensor<B, 1, Int>,
        train: bool,
    ) -> Tensor<B, 2> {
        let [rows, n_features] = x.dims();
        let words = self.word_embed.forward(x);
        let dim_emb = words.dims()[2];
        let words = words.reshape([rows, n_features * dim_emb]);
        let mark = self.posit_embed.forward(mark.reshape([rows, 1]));
        let dim_posit = mark.dims()[2];
        let mark = mark.reshape([rows, dim_posit]);
        let case = self.case_embed.forward(case.reshape([rows, 1]));
        let case = case.reshape([rows, dim_posit]);

        let h = self.hidden.forward(Tensor::cat(vec![words, mark, case], 1)).tanh();
        let h = if train { self.dropout.forward(h) } else { h };
        self.output.forward(h)
    }

    fn forward_batch(&self, batch: &PairBatch, train: bool, device: &B::Device) -> Tensor<B, 2> {
        let x = int_tensor::<B, 2>(&batch.x, [batch.n_rows, batch.n_features], device);
        let mark = int_tensor::<B, 1>(&batch.mark, [batch.n_rows], device);
        let case = int_tensor::<B, 1>(&batch.case, [batch.n_rows], device);
        self.forward(x, mark, case, train)
    }
}

impl<B: Backend> PasaModel<B> for MentionPairModel<B> {
    type Batch = PairBatch;

    fn forward_step(&self, batch: &PairBatch, _labels: &PasLabels, device: &B::Device) -> Result<StepOutput<B>> {
        let logits = self.forward_batch(batch, true, device);
        let targets = int_tensor::<B, 1>(&batch.y, [batch.n_rows], device);
        let loss = CrossEntropyLossConfig::new()
            .init(device)
            .forward(logits.clone(), targets);

        let sys = argmax_rows(&to_vec(logits.detach())?, 2);
        let mut eval = Eval::new();
        eval.update_pairs(&sys, &batch.y, &batch.case);
        Ok(StepOutput { loss, eval })
    }
}

impl<B: Backend> RoleScorer<B> for MentionPairModel<B> {
    fn role_scores(&self, sample: &Sample, labels: &PasLabels, device: &B::Device) -> Result<Vec<RoleScores>> {
        if sample.n_prds() == 0 {
            return Ok(Vec::new());
        }
        let pairs = PairSample::from_sample(sample, labels);
        let batch = PairBatch::from_pairs(&pairs);
        let probs = to_vec(softmax(self.forward_batch(&batch, false, device), 1))?;

        let mut roles: Vec<RoleScores> = (0..sample.n_prds())
            .map(|_| RoleScores {
                scores: [
                    vec![0.0; sample.n_words],
                    vec![0.0; sample.n_words],
                    vec![0.0; sample.n_words],
                ],
                null: [PAIR_THRESHOLD; 3],
            })
            .collect();
        for (pair, row) in pairs.iter().zip(probs.chunks(2)) {
            roles[pair.prd].scores[pair.case.index()][pair.arg] = row[1];
        }
        Ok(roles)
    }
}
