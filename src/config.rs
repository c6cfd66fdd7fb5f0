use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PasaError;

/// Which model variant to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Base,
    Grid,
    MentionPair,
    Ranking,
    Rerank,
    /// Relabels from the saved outputs of an earlier label model.
    Stacking,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Base => "base",
            ModelKind::Grid => "grid",
            ModelKind::MentionPair => "mention_pair",
            ModelKind::Ranking => "ranking",
            ModelKind::Rerank => "rerank",
            ModelKind::Stacking => "stacking",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub dim_emb: usize,
    pub dim_posit: usize,
    pub dim_hidden: usize,
    pub n_layers: usize,
    /// Width of the argument window; must be odd.
    pub window: usize,
    pub dropout: f64,
    pub n_best: usize,
    /// Per-word input width of `stacking`, taken from the outputs it reads.
    pub stack_input: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Base,
            dim_emb: 32,
            dim_posit: 5,
            dim_hidden: 32,
            n_layers: 1,
            window: 5,
            dropout: 0.0,
            n_best: 5,
            stack_input: 0,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), PasaError> {
        let check = |ok: bool, msg: &str| {
            if ok {
                Ok(())
            } else {
                Err(PasaError::Config(msg.to_string()))
            }
        };
        check(self.dim_emb > 0, "dim_emb must be > 0")?;
        check(self.dim_posit > 0, "dim_posit must be > 0")?;
        check(self.dim_hidden > 0, "dim_hidden must be > 0")?;
        check(self.n_layers > 0, "n_layers must be > 0")?;
        check(self.window % 2 == 1, "window must be odd")?;
        check((0.0..1.0).contains(&self.dropout), "dropout must be within [0,1)")?;
        check(self.n_best > 0, "n_best must be > 0")
    }

    /// Number of word ids per position: argument window plus predicate window.
    pub fn n_features(&self) -> usize {
        self.window + crate::data::PRD_WINDOW
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_data: PathBuf,
    pub dev_data: Option<PathBuf>,
    pub test_data: Option<PathBuf>,
    /// Maximum number of sentences read from each corpus.
    pub data_size: Option<usize>,
    pub vocab_cut_off: usize,
    /// Saved outputs (`*.outputs.bin.gz`) of an earlier model on each
    /// corpus; read by `stacking`.
    pub train_outputs: Option<PathBuf>,
    pub dev_outputs: Option<PathBuf>,
    pub test_outputs: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// L2 regularization strength, applied as weight decay.
    #[serde(default = "default_reg")]
    pub reg: f32,
    #[serde(default)]
    pub grad_clip: Option<f32>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_log_every")]
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            reg: default_reg(),
            grad_clip: None,
            seed: 0,
            log_every: default_log_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(default)]
    pub model: ModelConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub save: bool,
    /// Metadata file of a trained `base` checkpoint; required by `rerank`.
    #[serde(default)]
    pub base_checkpoint: Option<PathBuf>,
}

impl TrainConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: TrainConfig =
            serde_json::from_str(&config_str).with_context(|| "Failed to parse config JSON")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PasaError> {
        self.model.validate()?;
        if self.training.batch_size == 0 {
            return Err(PasaError::Config("batch_size must be > 0".into()));
        }
        if self.training.learning_rate <= 0.0 {
            return Err(PasaError::Config("learning_rate must be > 0".into()));
        }
        if self.training.log_every == 0 {
            return Err(PasaError::Config("log_every must be > 0".into()));
        }
        if self.model.kind == ModelKind::Rerank && self.base_checkpoint.is_none() {
            return Err(PasaError::Config(
                "rerank requires base_checkpoint".into(),
            ));
        }
        if self.model.kind == ModelKind::Stacking {
            let data = &self.data;
            let pairs = [
                ("train", Some(&data.train_data), &data.train_outputs),
                ("dev", data.dev_data.as_ref(), &data.dev_outputs),
                ("test", data.test_data.as_ref(), &data.test_outputs),
            ];
            for (split, corpus, outputs) in pairs {
                if corpus.is_some() && outputs.is_none() {
                    return Err(PasaError::Config(format!("stacking requires {}_outputs", split)));
                }
            }
        }
        Ok(())
    }

    /// File stem used for checkpoints of this configuration.
    pub fn model_name(&self) -> String {
        format!(
            "model.{}.layer-{}.window-{}.reg-{}",
            self.model.kind, self.model.n_layers, self.model.window, self.training.reg
        )
    }
}

fn default_epochs() -> usize {
    50
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_reg() -> f32 {
    1e-4
}

fn default_log_every() -> usize {
    1000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
