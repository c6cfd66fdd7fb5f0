use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Lstm, LstmConfig};
use burn::tensor::{backend::Backend, Int, Tensor};

use super::{
    int_tensor, reverse_time, sequence_step, Architecture, Encoder, LabelOutputs, LabelScorer, ModelDims, PasaModel,
    StepOutput,
};
use crate::config::ModelConfig;
use crate::data::{GridBatch, PasLabels, Sample};
use crate::error::Result;

/// Labels all predicates of a sentence jointly: after the per-predicate
/// encoder, LSTMs run across the predicate axis at every word position.
#[derive(Module, Debug)]
pub struct GridModel<B: Backend> {
    encoder: Encoder<B>,
    grid_fwd: Lstm<B>,
    grid_bwd: Lstm<B>,
    output: Linear<B>,
}

impl<B: Backend> Architecture<B> for GridModel<B> {
    fn init(config: &ModelConfig, dims: ModelDims, device: &B::Device) -> Self {
        let h = config.dim_hidden;
        Self {
            encoder: Encoder::new(config, dims.n_vocab, device),
            grid_fwd: LstmConfig::new(h, h, true).init(device),
            grid_bwd: LstmConfig::new(h, h, true).init(device),
            output: LinearConfig::new(h, dims.n_labels).init(device),
        }
    }
}

impl<B: Backend> GridModel<B> {
    /// `x_w: [n_sents * n_prds, n_words, n_features]` -> label logits
    /// `[n_sents * n_prds, n_words, n_labels]`.
    pub fn forward(
        &self,
        x_w: Tensor<B, 3, Int>,
        x_p: Tensor<B, 2, Int>,
        n_sents: usize,
        train: bool,
    ) -> Tensor<B, 3> {
        self.output.forward(self.encode(x_w, x_p, n_sents, train))
    }

    /// Hidden states after the predicate-axis LSTMs.
    fn encode(
        &self,
        x_w: Tensor<B, 3, Int>,
        x_p: Tensor<B, 2, Int>,
        n_sents: usize,
        train: bool,
    ) -> Tensor<B, 3> {
        let hidden = self.encoder.forward(x_w, x_p, train);
        let [rows, n_words, dim] = hidden.dims();
        let n_prds = rows / n_sents.max(1);

        // [sents, prds, words, dim] -> [sents * words, prds, dim]
        let across = hidden
            .reshape([n_sents, n_prds, n_words, dim])
            .swap_dims(1, 2)
            .reshape([n_sents * n_words, n_prds, dim]);

        let (fwd, _) = self.grid_fwd.forward(across.clone(), None);
        let (bwd, _) = self.grid_bwd.forward(reverse_time(across.clone()), None);
        let grid = across + fwd + reverse_time(bwd);

        grid.reshape([n_sents, n_words, n_prds, dim])
            .swap_dims(1, 2)
            .reshape([rows, n_words, dim])
    }

    fn encode_batch(&self, batch: &GridBatch, train: bool, device: &B::Device) -> Tensor<B, 3> {
        let rows = batch.n_sents * batch.n_prds;
        let x_w = int_tensor::<B, 3>(&batch.x_w, [rows, batch.n_words, batch.n_features], device);
        let x_p = int_tensor::<B, 2>(&batch.x_p, [rows, batch.n_words], device);
        self.encode(x_w, x_p, batch.n_sents, train)
    }
}

impl<B: Backend> PasaModel<B> for GridModel<B> {
    type Batch = GridBatch;

    fn forward_step(&self, batch: &GridBatch, labels: &PasLabels, device: &B::Device) -> Result<StepOutput<B>> {
        let logits = self.output.forward(self.encode_batch(batch, true, device));
        sequence_step(logits, &batch.y, labels, device)
    }
}

impl<B: Backend> LabelScorer<B> for GridModel<B> {
    fn label_outputs(&self, sample: &Sample, device: &B::Device) -> Result<LabelOutputs> {
        if sample.n_prds() == 0 {
            return Ok(LabelOutputs::default());
        }
        let hidden = self.encode_batch(&GridBatch::from_sample(sample), false, device);
        LabelOutputs::from_hidden(hidden, &self.output)
    }
}
