//! A one-parameter model whose loss is its weight times the batch value.

use burn::backend::Autodiff;
use burn::module::{Module, Param};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::Adam;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use burn_ndarray::NdArray;

use super::trainer::{build_optimizer, Trainer};
use crate::config::TrainingConfig;
use crate::data::{PasLabels, Vocab};
use crate::error::Result;
use crate::eval::Eval;
use crate::model::{PasaModel, StepOutput};

pub type TestBackend = Autodiff<NdArray<f32>>;
pub type TestTrainer = Trainer<TestBackend, Scaled<TestBackend>, OptimizerAdaptor<Adam, Scaled<TestBackend>, TestBackend>>;

#[derive(Module, Debug)]
pub struct Scaled<B: Backend> {
    pub weight: Param<Tensor<B, 1>>,
}

impl<B: Backend> Scaled<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            weight: Param::from_tensor(Tensor::ones([1], device)),
        }
    }
}

impl<B: Backend> PasaModel<B> for Scaled<B> {
    type Batch = f32;

    fn forward_step(&self, batch: &f32, _labels: &PasLabels, _device: &B::Device) -> Result<StepOutput<B>> {
        Ok(StepOutput {
            loss: self.weight.val().mul_scalar(*batch),
            eval: Eval::new(),
        })
    }
}

pub fn trainer(seed: u64) -> TestTrainer {
    let device = Default::default();
    let config = TrainingConfig {
        seed,
        reg: 0.0,
        learning_rate: 0.1,
        ..TrainingConfig::default()
    };
    let labels = PasLabels::from_vocab(&Vocab::pas_labels()).unwrap();
    let optimizer = build_optimizer::<TestBackend, Scaled<TestBackend>>(&config);
    Trainer::new(Scaled::new(&device), optimizer, labels, config)
}
