use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Lstm, LstmConfig};
use burn::tensor::{backend::Backend, Int, Tensor};

use super::reverse_time;
use crate::config::ModelConfig;

/// Number of distinct position marks (inside / outside the predicate window).
pub const N_MARKS: usize = 2;

/// Embeds window features and position marks, then runs a stack of LSTMs
/// whose direction alternates from layer to layer.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    word_embed: Embedding<B>,
    posit_embed: Embedding<B>,
    layers: Vec<Lstm<B>>,
    dropout: Dropout,
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &ModelConfig, n_vocab: usize, device: &B::Device) -> Self {
        let word_embed = EmbeddingConfig::new(n_vocab, config.dim_emb).init(device);
        let posit_embed = EmbeddingConfig::new(N_MARKS, config.dim_posit).init(device);

        let d_input = config.dim_emb * config.n_features() + config.dim_posit;

        Self {
            word_embed,
            posit_embed,
            layers: lstm_stack(config, d_input, device),
            dropout: DropoutConfig::new(config.dropout).init(),
        }
    }

    /// `x_w: [rows, n_words, n_features]`, `x_p: [rows, n_words]`
    /// -> `[rows, n_words, dim_hidden]`
    pub fn forward(&self, x_w: Tensor<B, 3, Int>, x_p: Tensor<B, 2, Int>, train: bool) -> Tensor<B, 3> {
        let [rows, n_words, n_features] = x_w.dims();
        let words = self.word_embed.forward(x_w.reshape([rows, n_words * n_features]));
        let dim_emb = words.dims()[2];
        let words = words.reshape([rows, n_words, n_features * dim_emb]);
        let posit = self.posit_embed.forward(x_p);

        alternating_lstm(&self.layers, &self.dropout, Tensor::cat(vec![words, posit], 2), train)
    }
}

/// `config.n_layers` LSTMs of width `dim_hidden`, the first reading `d_input`.
pub(crate) fn lstm_stack<B: Backend>(config: &ModelConfig, d_input: usize, device: &B::Device) -> Vec<Lstm<B>> {
    (0..config.n_layers)
        .map(|i| {
            let d_in = if i == 0 { d_input } else { config.dim_hidden };
            LstmConfig::new(d_in, config.dim_hidden, true).init(device)
        })
        .collect()
}

/// Runs `layers` in turn, reversing time between them so that their
/// directions alternate. The result is in the input's time order.
pub(crate) fn alternating_lstm<B: Backend>(
    layers: &[Lstm<B>],
    dropout: &Dropout,
    input: Tensor<B, 3>,
    train: bool,
) -> Tensor<B, 3> {
    let mut hidden = input;
    let mut reversed = false;
    for (i, layer) in layers.iter().enumerate() {
        if i > 0 {
            hidden = reverse_time(hidden);
            reversed = !reversed;
        }
        let (output, _) = layer.forward(hidden, None);
        hidden = if train { dropout.forward(output) } else { output };
    }
    if reversed {
        hidden = reverse_time(hidden);
    }
    hidden
}
