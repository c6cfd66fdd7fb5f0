use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{backend::Backend, Int, Tensor};

use super::{int_tensor, sequence_step, Architecture, Encoder, LabelOutputs, LabelScorer, ModelDims, PasaModel, StepOutput};
use crate::config::ModelConfig;
use crate::data::{PasLabels, Sample, SeqBatch};
use crate::error::Result;

/// Labels the words of a sentence for one predicate at a time.
#[derive(Module, Debug)]
pub struct BaseModel<B: Backend> {
    encoder: Encoder<B>,
    output: Linear<B>,
}

impl<B: Backend> Architecture<B> for BaseModel<B> {
    fn init(config: &ModelConfig, dims: ModelDims, device: &B::Device) -> Self {
        Self {
            encoder: Encoder::new(config, dims.n_vocab, device),
            output: LinearConfig::new(config.dim_hidden, dims.n_labels).init(device),
        }
    }
}

impl<B: Backend> BaseModel<B> {
    /// Label logits `[rows, n_words, n_labels]`.
    pub fn forward(&self, x_w: Tensor<B, 3, Int>, x_p: Tensor<B, 2, Int>, train: bool) -> Tensor<B, 3> {
        let hidden = self.encoder.forward(x_w, x_p, train);
        self.output.forward(hidden)
    }

    fn encode_batch(&self, batch: &SeqBatch, train: bool, device: &B::Device) -> Tensor<B, 3> {
        let x_w = int_tensor::<B, 3>(&batch.x_w, [batch.n_rows, batch.n_words, batch.n_features], device);
        let x_p = int_tensor::<B, 2>(&batch.x_p, [batch.n_rows, batch.n_words], device);
        self.encoder.forward(x_w, x_p, train)
    }
}

impl<B: Backend> PasaModel<B> for BaseModel<B> {
    type Batch = SeqBatch;

    fn forward_step(&self, batch: &SeqBatch, labels: &PasLabels, device: &B::Device) -> Result<StepOutput<B>> {
        let logits = self.output.forward(self.encode_batch(batch, true, device));
        sequence_step(logits, &batch.y, labels, device)
    }
}

impl<B: Backend> LabelScorer<B> for BaseModel<B> {
    fn label_outputs(&self, sample: &Sample, device: &B::Device) -> Result<LabelOutputs> {
        if sample.n_prds() == 0 {
            return Ok(LabelOutputs::default());
        }
        let hidden = self.encode_batch(&SeqBatch::from_sample(sample), false, device);
        LabelOutputs::from_hidden(hidden, &self.output)
    }
}
