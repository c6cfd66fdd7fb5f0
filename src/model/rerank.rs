use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig, Lstm, LstmConfig};
use burn::tensor::{backend::Backend, Int, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{argmax_rows, float_tensor, int_tensor, to_vec, Architecture, LabelScorer, ModelDims, PasaModel, StepOutput};
use crate::config::ModelConfig;
use crate::data::{PasLabels, Sample};
use crate::decoder::{Candidate, Decoder};
use crate::error::Result;
use crate::eval::Eval;

/// The N-best candidates of one predicate, with the oracle among them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankSample {
    pub sent_index: usize,
    /// Position of the predicate in `Sample::prd_indices`.
    pub prd: usize,
    pub n_words: usize,
    /// `[n_words][n_features]`
    pub x_w: Vec<Vec<usize>>,
    pub candidates: Vec<Candidate>,
    pub gold: Vec<usize>,
    /// Candidate closest to gold by F1; the first one on ties.
    pub oracle: usize,
}

impl RerankSample {
    pub fn new(sample: &Sample, prd: usize, candidates: Vec<Candidate>, labels: &PasLabels) -> Self {
        let gold = sample.y[prd].clone();
        let mut oracle = 0;
        let mut best_f1 = f64::NEG_INFINITY;
        for (i, cand) in candidates.iter().enumerate() {
            let mut eval = Eval::new();
            eval.update_labels(&cand.labels, &gold, labels);
            let f1 = eval.all_f1();
            if f1 > best_f1 {
                best_f1 = f1;
                oracle = i;
            }
        }
        Self {
            sent_index: sample.sent_index,
            prd,
            n_words: sample.n_words,
            x_w: sample.x_w[prd].clone(),
            candidates,
            gold,
            oracle,
        }
    }
}

/// Runs the N-best decoder over the predictions of a trained scorer.
pub fn build_rerank_samples<B: Backend, M: LabelScorer<B>>(
    scorer: &M,
    samples: &[Sample],
    decoder: &Decoder,
    device: &B::Device,
) -> Result<Vec<RerankSample>> {
    let mut out = Vec::new();
    for sample in samples.iter().filter(|s| s.n_prds() > 0) {
        let probs = scorer.label_probs(sample, device)?;
        for (p, (prd_probs, &prd_index)) in probs.iter().zip(&sample.prd_indices).enumerate() {
            let candidates = decoder.n_best(prd_probs, prd_index);
            out.push(RerankSample::new(sample, p, candidates, decoder.labels()));
        }
    }
    Ok(out)
}

/// Predicates sharing sentence length and candidate count.
#[derive(Debug, Clone)]
pub struct RerankBatch {
    pub n_rows: usize,
    pub n_cands: usize,
    pub n_words: usize,
    pub n_features: usize,
    /// `[n_rows * n_cands, n_words, n_features]`
    pub x_w: Vec<usize>,
    /// `[n_rows * n_cands, n_words]`
    pub labels: Vec<usize>,
    /// `[n_rows * n_cands]`
    pub base_scores: Vec<f32>,
    pub oracle: Vec<usize>,
    /// `[n_rows, n_words]`
    pub gold: Vec<usize>,
}

impl RerankBatch {
    pub fn from_samples(samples: &[&RerankSample]) -> Self {
        let first = samples[0];
        let mut batch = RerankBatch {
            n_rows: samples.len(),
            n_cands: first.candidates.len(),
            n_words: first.n_words,
            n_features: first.x_w.first().map_or(0, Vec::len),
            x_w: Vec::new(),
            labels: Vec::new(),
            base_scores: Vec::new(),
            oracle: Vec::new(),
            gold: Vec::new(),
        };
        for sample in samples {
            for cand in &sample.candidates {
                batch.x_w.extend(sample.x_w.iter().flatten());
                batch.labels.extend_from_slice(&cand.labels);
                batch.base_scores.push(cand.score);
            }
            batch.oracle.push(sample.oracle);
            batch.gold.extend_from_slice(&sample.gold);
        }
        batch
    }

    /// Labels of the candidate chosen for every row.
    fn chosen_labels(&self, choice: &[usize]) -> Vec<usize> {
        let row_len = self.n_cands * self.n_words;
        choice
            .iter()
            .enumerate()
            .flat_map(move |(row, &c)| {
                let start = row * row_len + c * self.n_words;
                self.labels[start..start + self.n_words].iter().copied()
            })
            .collect()
    }
}

pub fn rerank_batches(samples: &[RerankSample], batch_size: usize) -> Vec<RerankBatch> {
    let mut groups: BTreeMap<(usize, usize), Vec<&RerankSample>> = BTreeMap::new();
    for sample in samples.iter().filter(|s| !s.candidates.is_empty()) {
        groups
            .entry((sample.n_words, sample.candidates.len()))
            .or_default()
            .push(sample);
    }
    groups
        .values()
        .flat_map(|group| group.chunks(batch_size.max(1)))
        .map(RerankBatch::from_samples)
        .collect()
}

/// Scores a candidate label sequence jointly with the sentence, on top of
/// the log-probability the base model gave it.
#[derive(Module, Debug)]
pub struct RerankModel<B: Backend> {
    word_embed: Embedding<B>,
    label_embed: Embedding<B>,
    lstm: Lstm<B>,
    output: Linear<B>,
}

impl<B: Backend> Architecture<B> for RerankModel<B> {
    fn init(config: &ModelConfig, dims: ModelDims, device: &B::Device) -> Self {
        let d_input = config.dim_emb * config.n_features() + config.dim_posit;
        Self {
            word_embed: EmbeddingConfig::new(dims.n_vocab, config.dim_emb).init(device),
            label_embed: EmbeddingConfig::new(dims.n_labels, config.dim_posit).init(device),
            lstm: LstmConfig::new(d_input, config.dim_hidden, true).init(device),
            output: LinearConfig::new(config.dim_hidden + 1, 1).init(device),
        }
    }
}

impl<B: Backend> RerankModel<B> {
    /// One score per candidate, `[n_rows * n_cands]`.
    pub fn forward(&self, x_w: Tensor<B, 3, Int>, labels: Tensor<B, 2, Int>, base_scores: Tensor<B, 1>) -> Tensor<B, 1> {
        let [rows, n_words, n_features] = x_w.dims();
        let words = self.word_embed.forward(x_w.reshape([rows, n_words * n_features]));
        let dim_emb = words.dims()[2];
        let words = words.reshape([rows, n_words, n_features * dim_emb]);
        let labels = self.label_embed.forward(labels);

        let (hidden, _) = self.lstm.forward(Tensor::cat(vec![words, labels], 2), None);
        let dim = hidden.dims()[2];
        let pooled = hidden.mean_dim(1).reshape([rows, dim]);
        let features = Tensor::cat(vec![pooled, base_scores.reshape([rows, 1])], 1);
        self.output.forward(features).reshape([rows])
    }

    /// Candidate scores `[n_rows, n_cands]`.
    fn forward_batch(&self, batch: &RerankBatch, device: &B::Device) -> Tensor<B, 2> {
        let total = batch.n_rows * batch.n_cands;
        let x_w = int_tensor::<B, 3>(&batch.x_w, [total, batch.n_words, batch.n_features], device);
        let labels = int_tensor::<B, 2>(&batch.labels, [total, batch.n_words], device);
        let base = float_tensor::<B, 1>(&batch.base_scores, [total], device);
        self.forward(x_w, labels, base).reshape([batch.n_rows, batch.n_cands])
    }

    /// Index of the best-scoring candidate.
    pub fn choose(&self, sample: &RerankSample, device: &B::Device) -> Result<usize> {
        if sample.candidates.len() <= 1 {
            return Ok(0);
        }
        let batch = RerankBatch::from_samples(&[sample]);
        let scores = to_vec(self.forward_batch(&batch, device))?;
        Ok(argmax_rows(&scores, batch.n_cands)[0])
    }
}

impl<B: Backend> PasaModel<B> for RerankModel<B> {
    type Batch = RerankBatch;

    fn forward_step(&self, batch: &RerankBatch, labels: &PasLabels, device: &B::Device) -> Result<StepOutput<B>> {
        let scores = self.forward_batch(batch, device);
        let targets = int_tensor::<B, 1>(&batch.oracle, [batch.n_rows], device);
        let loss = CrossEntropyLossConfig::new()
            .init(device)
            .forward(scores.clone(), targets);

        let choice = argmax_rows(&to_vec(scores.detach())?, batch.n_cands);
        let mut eval = Eval::new();
        eval.update_labels(&batch.chosen_labels(&choice), &batch.gold, labels);
        Ok(StepOutput { loss, eval })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Vocab;

    fn sample() -> Sample {
        Sample {
            sent_index: 3,
            n_words: 3,
            word_ids: vec![2, 3, 4],
            prd_indices: vec![1],
            x_w: vec![vec![vec![2, 3], vec![3, 4], vec![4, 0]]],
            x_p: vec![vec![0, 0, 0]],
            y: vec![vec![1, 4, 2]],
        }
    }

    fn cand(labels: Vec<usize>, score: f32) -> Candidate {
        Candidate { labels, score }
    }

    #[test]
    fn oracle_is_best_f1_candidate() {
        let labels = PasLabels::from_vocab(&Vocab::pas_labels()).unwrap();
        let cands = vec![
            cand(vec![0, 4, 0], -0.5),
            cand(vec![1, 4, 0], -0.7),
            cand(vec![1, 4, 2], -0.9),
            cand(vec![1, 4, 2], -1.0),
        ];
        let rs = RerankSample::new(&sample(), 0, cands, &labels);
        assert_eq!(rs.oracle, 2);
        assert_eq!(rs.gold, vec![1, 4, 2]);
    }

    #[test]
    fn batches_repeat_words_per_candidate() {
        let labels = PasLabels::from_vocab(&Vocab::pas_labels()).unwrap();
        let cands = vec![cand(vec![0, 4, 0], -0.5), cand(vec![1, 4, 2], -0.9)];
        let rs = RerankSample::new(&sample(), 0, cands, &labels);
        let batches = rerank_batches(&[rs.clone(), rs], 8);
        assert_eq!(batches.len(), 1);
        let b = &batches[0];
        assert_eq!((b.n_rows, b.n_cands, b.n_words, b.n_features), (2, 2, 3, 2));
        assert_eq!(b.x_w.len(), 2 * 2 * 3 * 2);
        assert_eq!(b.base_scores, vec![-0.5, -0.9, -0.5, -0.9]);
        assert_eq!(b.chosen_labels(&[1, 0]), vec![1, 4, 2, 0, 4, 0]);
    }
}
