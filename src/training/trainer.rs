use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::marker::PhantomData;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::data::PasLabels;
use crate::error::{PasaError, Result};
use crate::eval::Eval;
use crate::model::{to_vec, PasaModel};

/// Adam with the L2 penalty applied as weight decay, plus optional
/// gradient-norm clipping.
pub fn build_optimizer<B, M>(config: &TrainingConfig) -> OptimizerAdaptor<Adam, M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut adam = AdamConfig::new();
    if config.reg > 0.0 {
        adam = adam.with_weight_decay(Some(WeightDecayConfig::new(config.reg)));
    }
    if let Some(clip) = config.grad_clip {
        adam = adam.with_grad_clipping(Some(GradientClippingConfig::Norm(clip)));
    }
    adam.init::<B, M>()
}

pub struct Trainer<B, M, O>
where
    B: AutodiffBackend,
    M: PasaModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optimizer: O,
    labels: PasLabels,
    config: TrainingConfig,
    rng: StdRng,
    _backend: PhantomData<B>,
}

impl<B, M, O> Trainer<B, M, O>
where
    B: AutodiffBackend,
    M: PasaModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(model: M, optimizer: O, labels: PasLabels, config: TrainingConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            model,
            optimizer,
            labels,
            config,
            rng,
            _backend: PhantomData,
        }
    }

    /// One pass over `batches` in a fresh random order. Returns the training
    /// counts with the mean NLL per batch.
    pub fn train_one_epoch(&mut self, batches: &[M::Batch], device: &B::Device) -> Result<Eval> {
        let start = Instant::now();
        let order = self.batch_order(batches.len());

        let mut eval = Eval::new();
        for (i, &index) in order.iter().enumerate() {
            if (i + 1) % self.config.log_every == 0 {
                info!("\t{}/{}", i + 1, order.len());
            }

            let step = self.model.forward_step(&batches[index], &self.labels, device)?;
            let nll = to_vec(step.loss.clone().detach())?
                .first()
                .copied()
                .unwrap_or(f32::NAN);
            if !nll.is_finite() {
                return Err(PasaError::NonFiniteLoss { index, value: nll });
            }
            debug!("batch {} nll {:.6}", index, nll);

            let grads = GradientsParams::from_grads(step.loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            eval += step.eval;
            eval.nll += f64::from(nll);
        }

        if !batches.is_empty() {
            eval.nll /= batches.len() as f64;
        }
        info!("\tTime: {:.2?}", start.elapsed());
        Ok(eval)
    }

    /// A fresh permutation of `0..n_batches` drawn from the seeded RNG.
    fn batch_order(&mut self, n_batches: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n_batches).collect();
        order.shuffle(&mut self.rng);
        order
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }
}
