use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::TrainConfig;
use crate::data::Vocab;
use crate::model::{Architecture, ModelDims};

/// Metadata written next to the model weights and vocabularies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointData {
    pub epoch: usize,
    pub dev_f1: Option<f64>,
    pub config: TrainConfig,
    pub model_file: String,
    pub vocab_word_file: String,
    pub vocab_label_file: String,
    pub timestamp: u64,
}

/// A restored model with everything needed to build its inputs.
pub struct LoadedCheckpoint<M> {
    pub model: M,
    pub data: CheckpointData,
    pub vocab_word: Vocab,
    pub vocab_label: Vocab,
}

/// Saves weights, vocabularies and metadata under `checkpoint_dir`, named
/// after the configuration. Returns the metadata path.
pub fn save_checkpoint<B: Backend, M: Module<B>>(
    model: &M,
    epoch: usize,
    dev_f1: Option<f64>,
    config: &TrainConfig,
    vocab_word: &Vocab,
    vocab_label: &Vocab,
    checkpoint_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(checkpoint_dir)
        .with_context(|| format!("Failed to create checkpoint directory: {:?}", checkpoint_dir))?;

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let name = config.model_name();
    let model_file = format!("{}.weights", name);
    let model_path = checkpoint_dir.join(&model_file);

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), model_path.clone())
        .with_context(|| "Failed to save model weights")?;
    info!("Model weights saved to: {:?}", model_path);

    let vocab_word_file = format!("{}.vocab_word.json.gz", name);
    let vocab_label_file = format!("{}.vocab_label.json.gz", name);
    vocab_word.save(&checkpoint_dir.join(&vocab_word_file))?;
    vocab_label.save(&checkpoint_dir.join(&vocab_label_file))?;

    let data = CheckpointData {
        epoch,
        dev_f1,
        config: config.clone(),
        model_file,
        vocab_word_file,
        vocab_label_file,
        timestamp,
    };

    let metadata_path = checkpoint_dir.join(format!("{}.json", name));
    let metadata_json =
        serde_json::to_string_pretty(&data).with_context(|| "Failed to serialize checkpoint metadata")?;
    fs::write(&metadata_path, metadata_json)
        .with_context(|| format!("Failed to write checkpoint metadata: {:?}", metadata_path))?;

    info!("Checkpoint saved at epoch {}: {:?}", epoch, metadata_path);
    Ok(metadata_path)
}

pub fn read_metadata(checkpoint_path: &Path) -> Result<CheckpointData> {
    let metadata_json = fs::read_to_string(checkpoint_path)
        .with_context(|| format!("Failed to read checkpoint file: {:?}", checkpoint_path))?;
    serde_json::from_str(&metadata_json).with_context(|| "Failed to parse checkpoint metadata")
}

/// Rebuilds the model described by the metadata at `checkpoint_path` and
/// loads its weights and vocabularies.
pub fn load_checkpoint<B: Backend, M: Architecture<B>>(
    checkpoint_path: &Path,
    device: &B::Device,
) -> Result<LoadedCheckpoint<M>> {
    let data = read_metadata(checkpoint_path)?;
    info!(
        "Loading {} checkpoint from epoch {}",
        data.config.model.kind, data.epoch
    );

    let checkpoint_dir = checkpoint_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Invalid checkpoint path"))?;

    let vocab_word = Vocab::load(&checkpoint_dir.join(&data.vocab_word_file))?;
    let vocab_label = Vocab::load(&checkpoint_dir.join(&data.vocab_label_file))?;
    let dims = ModelDims {
        n_vocab: vocab_word.size(),
        n_labels: vocab_label.size(),
    };

    let model_path = checkpoint_dir.join(&data.model_file);
    let model = M::init(&data.config.model, dims, device);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(model_path.clone(), device)
        .with_context(|| format!("Failed to load model weights from: {:?}", model_path))?;
    let model = model.load_record(record);

    info!("Model weights loaded successfully");
    Ok(LoadedCheckpoint {
        model,
        data,
        vocab_word,
        vocab_label,
    })
}

/// Lists the checkpoint metadata files in a directory, sorted by epoch.
pub fn list_checkpoints(checkpoint_dir: &Path) -> Result<Vec<(PathBuf, CheckpointData)>> {
    if !checkpoint_dir.exists() {
        warn!("Checkpoint directory does not exist: {:?}", checkpoint_dir);
        return Ok(Vec::new());
    }

    let mut checkpoints = Vec::new();
    for entry in WalkDir::new(checkpoint_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            if let Ok(data) = read_metadata(path) {
                checkpoints.push((path.to_path_buf(), data));
            }
        }
    }

    checkpoints.sort_by_key(|(_, data)| data.epoch);
    Ok(checkpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataConfig, ModelConfig, TrainingConfig};
    use crate::model::BaseModel;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn config() -> TrainConfig {
        TrainConfig {
            model: ModelConfig {
                dim_emb: 4,
                dim_posit: 2,
                dim_hidden: 4,
                window: 3,
                ..ModelConfig::default()
            },
            data: DataConfig::default(),
            training: TrainingConfig::default(),
            output_dir: PathBuf::from("output"),
            save: true,
            base_checkpoint: None,
        }
    }

    #[test]
    fn test_list_empty_checkpoints() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoints = list_checkpoints(temp_dir.path()).unwrap();
        assert_eq!(checkpoints.len(), 0);
    }

    #[test]
    fn save_then_load_restores_model_and_vocabs() {
        let temp_dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = config();
        let mut vocab_word = Vocab::init_words();
        vocab_word.add_word("本");
        let vocab_label = Vocab::pas_labels();
        let dims = ModelDims {
            n_vocab: vocab_word.size(),
            n_labels: vocab_label.size(),
        };
        let model = BaseModel::<TestBackend>::init(&config.model, dims, &device);

        let path = save_checkpoint::<TestBackend, _>(
            &model,
            3,
            Some(0.5),
            &config,
            &vocab_word,
            &vocab_label,
            temp_dir.path(),
        )
        .unwrap();

        let loaded = load_checkpoint::<TestBackend, BaseModel<TestBackend>>(&path, &device).unwrap();
        assert_eq!(loaded.data.epoch, 3);
        assert_eq!(loaded.data.dev_f1, Some(0.5));
        assert_eq!(loaded.vocab_word.get_id("本"), Some(2));
        assert_eq!(loaded.vocab_label.size(), 5);

        let listed = list_checkpoints(temp_dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1.epoch, 3);
    }
}
