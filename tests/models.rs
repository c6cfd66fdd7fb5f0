use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use neural_pasa::checkpoint::list_checkpoints;
use neural_pasa::config::{DataConfig, ModelConfig, ModelKind, TrainConfig, TrainingConfig};
use neural_pasa::data::{build_samples, load_ntc, PasLabels, Vocab};
use neural_pasa::io::load_outputs;
use neural_pasa::model::{Architecture, BaseModel, LabelScorer, ModelDims};
use neural_pasa::{predict_from_checkpoint, train, PredictOptions};

type TestBackend = Autodiff<NdArray<f32>>;

const CORPUS: &str = "\
# S-ID:1
* 0 2D
彼	名詞	id=\"1\"
は	助詞	_
* 1 2D
本	名詞	id=\"2\"
を	助詞	_
* 2 -1D
読ん	動詞	type=\"pred\" ga=\"1\" o=\"2\"
だ	助動詞	_
EOS
# S-ID:2
* 0 1D
母	名詞	id=\"1\"
が	助詞	_
* 1 -1D
来た	動詞	type=\"pred\" ga=\"1\"
EOS
# S-ID:3
* 0 2D
彼	名詞	id=\"1\"
が	助詞	_
* 1 2D
友達	名詞	id=\"2\"
に	助詞	_
* 2 -1D
会った	動詞	type=\"pred\" ga=\"1\" ni=\"2\"
EOS
";

fn write_corpus(dir: &Path) -> PathBuf {
    let path = dir.join("train.ntc");
    fs::write(&path, CORPUS).unwrap();
    path
}

fn config(kind: ModelKind, corpus: &Path, output_dir: &Path) -> TrainConfig {
    TrainConfig {
        model: ModelConfig {
            kind,
            dim_emb: 4,
            dim_posit: 2,
            dim_hidden: 6,
            n_layers: 2,
            window: 3,
            dropout: 0.1,
            n_best: 3,
            ..ModelConfig::default()
        },
        data: DataConfig {
            train_data: corpus.to_path_buf(),
            dev_data: Some(corpus.to_path_buf()),
            test_data: Some(corpus.to_path_buf()),
            ..DataConfig::default()
        },
        training: TrainingConfig {
            epochs: 1,
            batch_size: 2,
            log_every: 1,
            ..TrainingConfig::default()
        },
        output_dir: output_dir.to_path_buf(),
        save: true,
        base_checkpoint: None,
    }
}

#[test]
fn base_model_probabilities_are_distributions() {
    let dir = TempDir::new().unwrap();
    let corpus = load_ntc(&write_corpus(dir.path()), None).unwrap();
    let mut vocab = Vocab::init_words();
    for word in corpus.iter().flat_map(|s| &s.words) {
        vocab.add_word(&word.form);
    }
    let vocab_label = Vocab::pas_labels();
    let labels = PasLabels::from_vocab(&vocab_label).unwrap();
    let samples = build_samples(&corpus, &vocab, &labels, 3);

    let device = Default::default();
    let dims = ModelDims {
        n_vocab: vocab.size(),
        n_labels: vocab_label.size(),
    };
    let model = BaseModel::<TestBackend>::init(&config(ModelKind::Base, Path::new("x"), dir.path()).model, dims, &device);

    let probs = model.label_probs(&samples[0], &device).unwrap();
    assert_eq!(probs.len(), 1);
    assert_eq!(probs[0].len(), 6);
    for dist in &probs[0] {
        assert_eq!(dist.len(), 5);
        let total: f32 = dist.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }
}

#[test]
fn every_kind_trains_for_one_epoch() {
    let dir = TempDir::new().unwrap();
    let corpus = write_corpus(dir.path());
    let device = Default::default();

    for kind in [ModelKind::Base, ModelKind::Grid, ModelKind::MentionPair, ModelKind::Ranking] {
        let output = dir.path().join(kind.to_string());
        let history = train::<TestBackend>(&config(kind, &corpus, &output), &device).unwrap();
        assert!(history.entries().len() <= 1, "{}", kind);
        for entry in history.entries() {
            assert!((0.0..=1.0).contains(&entry.dev_f1));
            assert!(entry.test_f1.is_some());
        }
    }
}

#[test]
fn saved_base_model_predicts_and_feeds_reranker() {
    let dir = TempDir::new().unwrap();
    let corpus = write_corpus(dir.path());
    let device = Default::default();

    let mut base_config = config(ModelKind::Base, &corpus, dir.path());
    base_config.data.dev_data = None;
    train::<TestBackend>(&base_config, &device).unwrap();

    let checkpoints = list_checkpoints(dir.path()).unwrap();
    assert_eq!(checkpoints.len(), 1);
    let (base_path, data) = &checkpoints[0];
    assert_eq!(data.epoch, 1);
    assert_eq!(data.dev_f1, None);
    assert!(dir.path().join(format!("{}.test.results.txt", base_config.model_name())).exists());

    let predictions = dir.path().join("predict");
    let options = PredictOptions {
        checkpoint: base_path,
        data: &corpus,
        data_size: Some(2),
        output_dir: Some(&predictions),
        outputs: None,
    };
    let f1 = predict_from_checkpoint::<NdArray<f32>>(&options, &device).unwrap();
    assert!((0.0..=1.0).contains(&f1));
    assert!(predictions
        .join(format!("{}.predict.outputs.bin.gz", base_config.model_name()))
        .exists());

    let rerank_dir = dir.path().join("rerank");
    let mut rerank_config = config(ModelKind::Rerank, &corpus, &rerank_dir);
    rerank_config.base_checkpoint = Some(base_path.clone());
    let history = train::<TestBackend>(&rerank_config, &device).unwrap();
    assert!(history.entries().len() <= 1);
    assert_eq!(list_checkpoints(&rerank_dir).unwrap().len(), history.entries().len());
}

#[test]
fn stacking_trains_on_saved_base_outputs() {
    let dir = TempDir::new().unwrap();
    let corpus = write_corpus(dir.path());
    let device = Default::default();

    let base_dir = dir.path().join("base");
    let mut base_config = config(ModelKind::Base, &corpus, &base_dir);
    base_config.data.dev_data = None;
    base_config.data.test_data = None;
    train::<TestBackend>(&base_config, &device).unwrap();
    let (base_path, _) = list_checkpoints(&base_dir).unwrap().remove(0);

    let labelled = dir.path().join("labelled");
    let options = PredictOptions {
        checkpoint: &base_path,
        data: &corpus,
        data_size: None,
        output_dir: Some(&labelled),
        outputs: None,
    };
    predict_from_checkpoint::<NdArray<f32>>(&options, &device).unwrap();
    let outputs = labelled.join(format!("{}.predict.outputs.bin.gz", base_config.model_name()));
    let saved = load_outputs(&outputs).unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[0].hidden[0][0].len(), 6);

    let stack_dir = dir.path().join("stacking");
    let mut stack_config = config(ModelKind::Stacking, &corpus, &stack_dir);
    stack_config.data.train_outputs = Some(outputs.clone());
    stack_config.data.dev_outputs = Some(outputs.clone());
    stack_config.data.test_outputs = Some(outputs.clone());
    let history = train::<TestBackend>(&stack_config, &device).unwrap();
    assert!(history.entries().len() <= 1);

    let mut no_outputs = stack_config.clone();
    no_outputs.data.test_outputs = None;
    assert!(train::<TestBackend>(&no_outputs, &device).is_err());

    if let Some((stack_path, data)) = list_checkpoints(&stack_dir).unwrap().pop() {
        // hidden width plus one probability per label
        assert_eq!(data.config.model.stack_input, 6 + 5);
        let options = PredictOptions {
            checkpoint: &stack_path,
            data: &corpus,
            data_size: None,
            output_dir: None,
            outputs: Some(&outputs),
        };
        let f1 = predict_from_checkpoint::<NdArray<f32>>(&options, &device).unwrap();
        assert!((0.0..=1.0).contains(&f1));

        let missing = PredictOptions { outputs: None, ..options };
        assert!(predict_from_checkpoint::<NdArray<f32>>(&missing, &device).is_err());
    }
}
