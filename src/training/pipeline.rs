use anyhow::{bail, Context, Result};
use burn::module::{AutodiffModule, Module};
use burn::optim::Optimizer;
use burn::tensor::backend::{AutodiffBackend, Backend};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use super::history::F1History;
use super::predict::{eval_one_epoch, outputs_by_sentence, Prediction, Predictor, Reranker, Stacker};
use super::trainer::{build_optimizer, Trainer};
use crate::checkpoint::{load_checkpoint, read_metadata, save_checkpoint, CheckpointData, LoadedCheckpoint};
use crate::config::{DataConfig, ModelKind, TrainConfig};
use crate::data::{
    build_samples, corpus_statistics, count_words, grid_batches, load_ntc, pair_batches, sequence_batches, PairSample,
    PasLabels, Sample, Sentence, Vocab, WordFreqs,
};
use crate::decoder::Decoder;
use crate::error::PasaError;
use crate::io::{load_outputs, save_outputs, save_pas_results};
use crate::model::{
    build_rerank_samples, rerank_batches, stacking_batches, Architecture, BaseModel, GridModel, LabelOutputs,
    MentionPairModel, ModelDims, PasaModel, RankingModel, RerankModel, StackingModel, StackingSample,
};

/// A corpus with its samples.
pub struct Split {
    pub name: &'static str,
    pub corpus: Vec<Sentence>,
    pub samples: Vec<Sample>,
}

impl Split {
    fn new(name: &'static str, corpus: Vec<Sentence>, vocab_word: &Vocab, labels: &PasLabels, window: usize) -> Self {
        let samples = build_samples(&corpus, vocab_word, labels, window);
        let n_prds: usize = samples.iter().map(Sample::n_prds).sum();
        info!("{} samples: {}  predicates: {}", name.to_uppercase(), samples.len(), n_prds);
        Self { name, corpus, samples }
    }
}

pub struct PreparedData {
    pub vocab_word: Vocab,
    pub vocab_label: Vocab,
    pub labels: PasLabels,
    pub train: Split,
    pub dev: Option<Split>,
    pub test: Option<Split>,
}

impl PreparedData {
    pub fn dims(&self) -> ModelDims {
        ModelDims {
            n_vocab: self.vocab_word.size(),
            n_labels: self.vocab_label.size(),
        }
    }
}

/// Loads the corpora and builds vocabularies and samples. Given `vocabs`
/// (from a checkpoint), those are used instead of counting words.
pub fn prepare_data(config: &DataConfig, window: usize, vocabs: Option<(Vocab, Vocab)>) -> Result<PreparedData> {
    let train = load_ntc(&config.train_data, config.data_size)?;
    let dev = config
        .dev_data
        .as_deref()
        .map(|path| load_ntc(path, config.data_size))
        .transpose()?;
    let test = config
        .test_data
        .as_deref()
        .map(|path| load_ntc(path, config.data_size))
        .transpose()?;

    for (name, corpus) in [("TRAIN", Some(&train)), ("DEV", dev.as_ref()), ("TEST", test.as_ref())] {
        if let Some(corpus) = corpus {
            info!("{} {}", name, corpus_statistics(corpus));
        }
    }

    let (vocab_word, vocab_label) = match vocabs {
        Some(vocabs) => vocabs,
        None => {
            let mut freqs = WordFreqs::new();
            for corpus in [Some(&train), dev.as_ref(), test.as_ref()].into_iter().flatten() {
                count_words(&mut freqs, corpus);
            }
            let mut vocab_word = Vocab::init_words();
            vocab_word.add_vocab(&freqs, config.vocab_cut_off);
            (vocab_word, Vocab::pas_labels())
        }
    };
    info!("Vocab words: {}  labels: {}", vocab_word.size(), vocab_label.size());

    let labels = PasLabels::from_vocab(&vocab_label)?;
    let train = Split::new("train", train, &vocab_word, &labels, window);
    let dev = dev.map(|corpus| Split::new("dev", corpus, &vocab_word, &labels, window));
    let test = test.map(|corpus| Split::new("test", corpus, &vocab_word, &labels, window));

    Ok(PreparedData {
        vocab_word,
        vocab_label,
        labels,
        train,
        dev,
        test,
    })
}

/// Trains the model `config` names and returns its F1 history.
pub fn train<B: AutodiffBackend>(config: &TrainConfig, device: &B::Device) -> Result<F1History> {
    config.validate()?;
    info!("Model: {}", config.model_name());

    let batch_size = config.training.batch_size;
    let prepare = || prepare_data(&config.data, config.model.window, None);
    match config.model.kind {
        ModelKind::Base => {
            let data = prepare()?;
            let batches = sequence_batches(&data.train.samples, batch_size);
            fit::<B, BaseModel<B>>(config, &data, batches, device)
        }
        ModelKind::Grid => {
            let data = prepare()?;
            let batches = grid_batches(&data.train.samples, batch_size);
            fit::<B, GridModel<B>>(config, &data, batches, device)
        }
        ModelKind::MentionPair => {
            let data = prepare()?;
            let pairs: Vec<PairSample> = data
                .train
                .samples
                .iter()
                .flat_map(|sample| PairSample::from_sample(sample, &data.labels))
                .collect();
            info!("Pair samples: {}", pairs.len());
            let batches = pair_batches(&pairs, batch_size);
            fit::<B, MentionPairModel<B>>(config, &data, batches, device)
        }
        ModelKind::Ranking => {
            let data = prepare()?;
            let batches = sequence_batches(&data.train.samples, batch_size);
            fit::<B, RankingModel<B>>(config, &data, batches, device)
        }
        ModelKind::Rerank => train_rerank::<B>(config, device),
        ModelKind::Stacking => train_stacking::<B>(config, device),
    }
}

fn fit<B, M>(config: &TrainConfig, data: &PreparedData, batches: Vec<M::Batch>, device: &B::Device) -> Result<F1History>
where
    B: AutodiffBackend,
    M: Architecture<B> + PasaModel<B> + AutodiffModule<B> + Predictor<B>,
{
    info!("Batches: {}", batches.len());
    let model = M::init(&config.model, data.dims(), device);
    let optimizer = build_optimizer::<B, M>(&config.training);
    let trainer = Trainer::new(model, optimizer, data.labels, config.training.clone());
    let decoder = Decoder::new(data.labels, config.model.n_best);

    run_epochs(config, data, trainer, &batches, device, |model: &M, split: &Split| {
        eval_one_epoch::<B, M>(model, &split.corpus, &split.samples, &decoder, device)
    })
}

fn train_rerank<B: AutodiffBackend>(config: &TrainConfig, device: &B::Device) -> Result<F1History> {
    let base_path = config
        .base_checkpoint
        .as_deref()
        .ok_or_else(|| PasaError::Config("rerank requires base_checkpoint".into()))?;
    let base: LoadedCheckpoint<BaseModel<B>> = load_checkpoint::<B, BaseModel<B>>(base_path, device)?;
    if base.data.config.model.kind != ModelKind::Base {
        bail!(
            "{:?} holds a {} model; reranking needs a base model",
            base_path,
            base.data.config.model.kind
        );
    }

    // Inputs must be built the way the base model saw them.
    let mut config = config.clone();
    config.model.window = base.data.config.model.window;

    let vocabs = (base.vocab_word.clone(), base.vocab_label.clone());
    let data = prepare_data(&config.data, config.model.window, Some(vocabs))?;
    let decoder = Decoder::new(data.labels, config.model.n_best);

    info!("Building {}-best lists with the base model", config.model.n_best);
    let samples = build_rerank_samples::<B, _>(&base.model, &data.train.samples, &decoder, device)?;
    let batches = rerank_batches(&samples, config.training.batch_size);
    info!("Rerank samples: {}  batches: {}", samples.len(), batches.len());

    let model = RerankModel::<B>::init(&config.model, data.dims(), device);
    let optimizer = build_optimizer::<B, RerankModel<B>>(&config.training);
    let trainer = Trainer::new(model, optimizer, data.labels, config.training.clone());

    run_epochs(&config, &data, trainer, &batches, device, |model: &RerankModel<B>, split: &Split| {
        let reranker = Reranker {
            base: &base.model,
            model,
        };
        eval_one_epoch::<B, _>(&reranker, &split.corpus, &split.samples, &decoder, device)
    })
}

/// Saved outputs of an earlier label model, keyed by sentence index.
fn read_stack_inputs(path: &Path) -> Result<BTreeMap<usize, LabelOutputs>> {
    let outputs = outputs_by_sentence(load_outputs(path)?);
    info!("Loaded outputs of {} sentences from {:?}", outputs.len(), path);
    Ok(outputs)
}

fn train_stacking<B: AutodiffBackend>(config: &TrainConfig, device: &B::Device) -> Result<F1History> {
    let paths = [
        ("train", config.data.train_outputs.as_deref()),
        ("dev", config.data.dev_outputs.as_deref()),
        ("test", config.data.test_outputs.as_deref()),
    ];
    let mut inputs = BTreeMap::new();
    for (split, path) in paths {
        if let Some(path) = path {
            inputs.insert(split, read_stack_inputs(path)?);
        }
    }

    let data = prepare_data(&config.data, config.model.window, None)?;
    let train_inputs = inputs
        .get("train")
        .ok_or_else(|| PasaError::Config("stacking requires train_outputs".into()))?;
    let samples: Vec<StackingSample> = data
        .train
        .samples
        .iter()
        .filter(|sample| sample.n_prds() > 0)
        .map(|sample| {
            let outputs = train_inputs.get(&sample.sent_index).ok_or_else(|| {
                PasaError::Shape(format!("no saved outputs for sentence {}", sample.sent_index))
            })?;
            StackingSample::new(sample, outputs)
        })
        .collect::<crate::error::Result<_>>()?;

    let n_input = samples.first().map_or(0, StackingSample::n_input);
    if n_input == 0 {
        bail!("train_outputs hold no label distributions");
    }
    if let Some(other) = samples.iter().find(|s| s.n_input() != n_input) {
        bail!(
            "sentence {} has {} output features, expected {}",
            other.sent_index,
            other.n_input(),
            n_input
        );
    }

    let mut config = config.clone();
    config.model.stack_input = n_input;
    let batches = stacking_batches(&samples, config.training.batch_size);
    info!("Stacking inputs: {}  batches: {}", n_input, batches.len());

    let model = StackingModel::<B>::init(&config.model, data.dims(), device);
    let optimizer = build_optimizer::<B, StackingModel<B>>(&config.training);
    let trainer = Trainer::new(model, optimizer, data.labels, config.training.clone());
    let decoder = Decoder::new(data.labels, config.model.n_best);

    run_epochs(&config, &data, trainer, &batches, device, |model: &StackingModel<B>, split: &Split| {
        let outputs = inputs
            .get(split.name)
            .ok_or_else(|| PasaError::Config(format!("stacking requires {}_outputs", split.name)))?;
        let stacker = Stacker { model, outputs };
        eval_one_epoch::<B, _>(&stacker, &split.corpus, &split.samples, &decoder, device)
    })
}

/// The epoch loop with dev-based model selection. TEST is scored every
/// epoch; its F1 enters the history and its predictions are saved only at
/// epochs where DEV improved. Without a dev set the last epoch is selected.
fn run_epochs<B, M, O, F>(
    config: &TrainConfig,
    data: &PreparedData,
    mut trainer: Trainer<B, M, O>,
    batches: &[M::Batch],
    device: &B::Device,
    evaluate: F,
) -> Result<F1History>
where
    B: AutodiffBackend,
    M: PasaModel<B> + AutodiffModule<B>,
    O: Optimizer<M, B>,
    F: Fn(&M, &Split) -> crate::error::Result<(f64, Vec<Prediction>)>,
{
    let mut history = F1History::new();
    let epochs = config.training.epochs;

    for epoch in 1..=epochs {
        info!("Epoch: {}", epoch);
        info!("  TRAIN");
        let train_eval = trainer.train_one_epoch(batches, device)?;
        train_eval.show_results();

        let dev_f1 = match &data.dev {
            Some(dev) => {
                info!("  DEV");
                Some(evaluate(trainer.model(), dev)?.0)
            }
            None => None,
        };
        let test = match &data.test {
            Some(test) => {
                info!("  TEST");
                Some((test, evaluate(trainer.model(), test)?))
            }
            None => None,
        };

        let selected = match dev_f1 {
            Some(dev_f1) => history.update_dev(epoch, dev_f1),
            None => epoch == epochs,
        };
        if selected {
            if let Some((_, (test_f1, _))) = &test {
                history.record_test(*test_f1);
            }
            if config.save {
                save_model::<B, M>(config, data, trainer.model(), epoch, dev_f1)?;
                if let Some((split, (_, predictions))) = &test {
                    save_predictions(config, split, predictions, &data.labels)?;
                }
            }
        }
        history.show();
    }
    Ok(history)
}

fn save_model<B: Backend, M: Module<B>>(
    config: &TrainConfig,
    data: &PreparedData,
    model: &M,
    epoch: usize,
    dev_f1: Option<f64>,
) -> Result<()> {
    save_checkpoint::<B, M>(
        model,
        epoch,
        dev_f1,
        config,
        &data.vocab_word,
        &data.vocab_label,
        &config.output_dir,
    )?;
    Ok(())
}

fn save_predictions(config: &TrainConfig, split: &Split, predictions: &[Prediction], labels: &PasLabels) -> Result<()> {
    write_predictions(&config.output_dir, &config.model_name(), split, predictions, labels)
}

fn write_predictions(
    dir: &Path,
    name: &str,
    split: &Split,
    predictions: &[Prediction],
    labels: &PasLabels,
) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    let results = dir.join(format!("{}.{}.results.txt", name, split.name));
    save_pas_results(&results, &split.corpus, predictions, labels)?;
    let outputs = dir.join(format!("{}.{}.outputs.bin.gz", name, split.name));
    save_outputs(&outputs, predictions)?;
    info!("Predictions written to {:?}", results);
    Ok(())
}

/// Options of a prediction run from a saved checkpoint.
pub struct PredictOptions<'a> {
    pub checkpoint: &'a Path,
    pub data: &'a Path,
    pub data_size: Option<usize>,
    /// Where results and raw outputs go; nothing is written when `None`.
    pub output_dir: Option<&'a Path>,
    /// Saved outputs of the earlier model on `data`; needed by `stacking`.
    pub outputs: Option<&'a Path>,
}

/// Restores a checkpoint of any kind, labels a corpus with it and returns the
/// overall F1 against the corpus annotation.
pub fn predict_from_checkpoint<B: Backend>(options: &PredictOptions<'_>, device: &B::Device) -> Result<f64> {
    let metadata = read_metadata(options.checkpoint)?;
    let checkpoint = options.checkpoint;
    match metadata.config.model.kind {
        ModelKind::Base => {
            let loaded = load_checkpoint::<B, BaseModel<B>>(checkpoint, device)?;
            run_prediction(&loaded.model, &loaded.data, &loaded.vocab_word, &loaded.vocab_label, options, device)
        }
        ModelKind::Grid => {
            let loaded = load_checkpoint::<B, GridModel<B>>(checkpoint, device)?;
            run_prediction(&loaded.model, &loaded.data, &loaded.vocab_word, &loaded.vocab_label, options, device)
        }
        ModelKind::MentionPair => {
            let loaded = load_checkpoint::<B, MentionPairModel<B>>(checkpoint, device)?;
            run_prediction(&loaded.model, &loaded.data, &loaded.vocab_word, &loaded.vocab_label, options, device)
        }
        ModelKind::Ranking => {
            let loaded = load_checkpoint::<B, RankingModel<B>>(checkpoint, device)?;
            run_prediction(&loaded.model, &loaded.data, &loaded.vocab_word, &loaded.vocab_label, options, device)
        }
        ModelKind::Rerank => {
            let base_path = metadata
                .config
                .base_checkpoint
                .as_deref()
                .ok_or_else(|| PasaError::Config("rerank checkpoint names no base_checkpoint".into()))?;
            let base = load_checkpoint::<B, BaseModel<B>>(base_path, device)?;
            let loaded = load_checkpoint::<B, RerankModel<B>>(checkpoint, device)?;
            let reranker = Reranker {
                base: &base.model,
                model: &loaded.model,
            };
            run_prediction(&reranker, &loaded.data, &loaded.vocab_word, &loaded.vocab_label, options, device)
        }
        ModelKind::Stacking => {
            let path = options
                .outputs
                .ok_or_else(|| PasaError::Config("stacking prediction requires saved outputs".into()))?;
            let outputs = read_stack_inputs(path)?;
            let loaded = load_checkpoint::<B, StackingModel<B>>(checkpoint, device)?;
            let stacker = Stacker {
                model: &loaded.model,
                outputs: &outputs,
            };
            run_prediction(&stacker, &loaded.data, &loaded.vocab_word, &loaded.vocab_label, options, device)
        }
    }
}

fn run_prediction<B: Backend, P: Predictor<B>>(
    predictor: &P,
    metadata: &CheckpointData,
    vocab_word: &Vocab,
    vocab_label: &Vocab,
    options: &PredictOptions<'_>,
    device: &B::Device,
) -> Result<f64> {
    let corpus = load_ntc(options.data, options.data_size)?;
    info!("DATA {}", corpus_statistics(&corpus));

    let labels = PasLabels::from_vocab(vocab_label)?;
    let split = Split::new("predict", corpus, vocab_word, &labels, metadata.config.model.window);
    let decoder = Decoder::new(labels, metadata.config.model.n_best);

    let (f1, predictions) = eval_one_epoch::<B, P>(predictor, &split.corpus, &split.samples, &decoder, device)?;
    if let Some(dir) = options.output_dir {
        write_predictions(dir, &metadata.config.model_name(), &split, &predictions, &labels)?;
    }
    Ok(f1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::scaled::trainer;
    use std::cell::RefCell;

    fn split(name: &'static str) -> Split {
        Split {
            name,
            corpus: Vec::new(),
            samples: Vec::new(),
        }
    }

    fn data(dev: bool) -> PreparedData {
        let vocab_label = Vocab::pas_labels();
        PreparedData {
            vocab_word: Vocab::init_words(),
            labels: PasLabels::from_vocab(&vocab_label).unwrap(),
            vocab_label,
            train: split("train"),
            dev: dev.then(|| split("dev")),
            test: Some(split("test")),
        }
    }

    fn config(epochs: usize) -> TrainConfig {
        let mut config: TrainConfig = serde_json::from_str(r#"{"data": {}}"#).unwrap();
        config.training.epochs = epochs;
        config
    }

    /// Runs the loop with scripted F1 values per split and returns the
    /// history and the splits in the order they were scored.
    fn run(dev: bool, dev_f1: &[f64], test_f1: &[f64]) -> (F1History, Vec<&'static str>) {
        let calls = RefCell::new(Vec::new());
        let epochs = test_f1.len();
        let device = Default::default();
        let history = run_epochs(&config(epochs), &data(dev), trainer(0), [1.0_f32].as_slice(), &device, |_, split: &Split| {
            let mut calls = calls.borrow_mut();
            let seen = calls.iter().filter(|&&name| name == split.name).count();
            calls.push(split.name);
            let f1 = if split.name == "dev" { dev_f1[seen] } else { test_f1[seen] };
            Ok((f1, Vec::new()))
        })
        .unwrap();
        (history, calls.into_inner())
    }

    #[test]
    fn test_is_scored_every_epoch_but_recorded_on_dev_improvement() {
        let (history, calls) = run(true, &[0.3, 0.2, 0.5], &[0.6, 0.9, 0.7]);
        assert_eq!(calls, ["dev", "test", "dev", "test", "dev", "test"]);
        let entries: Vec<_> = history
            .entries()
            .iter()
            .map(|e| (e.epoch, e.dev_f1, e.test_f1))
            .collect();
        assert_eq!(entries, [(1, 0.3, Some(0.6)), (3, 0.5, Some(0.7))]);
    }

    #[test]
    fn without_dev_the_history_stays_empty() {
        let (history, calls) = run(false, &[], &[0.4, 0.5]);
        assert_eq!(calls, ["test", "test"]);
        assert!(history.entries().is_empty());
    }
}
