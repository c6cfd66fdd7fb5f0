use anyhow::{Context, Result};
use burn::backend::Autodiff;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use neural_pasa::checkpoint::list_checkpoints;
use neural_pasa::{predict_from_checkpoint, train, PredictOptions, TrainConfig};

#[cfg(not(any(feature = "wgpu-backend", feature = "tch-backend")))]
type InferBackend = burn_ndarray::NdArray<f32>;
#[cfg(feature = "wgpu-backend")]
type InferBackend = burn_wgpu::Wgpu;
#[cfg(all(feature = "tch-backend", not(feature = "wgpu-backend")))]
type InferBackend = burn_tch::LibTorch<f32>;

type Backend = Autodiff<InferBackend>;

#[derive(Debug, Parser)]
#[command(author, version, about = "Neural predicate-argument structure analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Train a model and select it on the dev set
    Train(TrainArgs),
    /// Label a corpus with a saved checkpoint and evaluate it
    Predict(PredictArgs),
    /// List the checkpoints saved in a directory
    Checkpoints(CheckpointsArgs),
}

#[derive(Debug, Args)]
struct TrainArgs {
    /// Path to configuration JSON file
    #[arg(long)]
    config: PathBuf,
    /// Overrides the number of epochs
    #[arg(long)]
    epochs: Option<usize>,
    /// Save the best model and test predictions
    #[arg(long)]
    save: bool,
    /// Overrides the output directory
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PredictArgs {
    /// Checkpoint metadata file
    #[arg(long)]
    checkpoint: PathBuf,
    /// Corpus file or directory to label
    #[arg(long)]
    data: PathBuf,
    /// Directory for results and raw outputs
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Maximum number of sentences to read
    #[arg(long)]
    data_size: Option<usize>,
    /// Saved outputs of the earlier model on the same corpus (stacking)
    #[arg(long)]
    outputs: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CheckpointsArgs {
    #[arg(long, default_value = "output")]
    dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => train_command(args),
        Commands::Predict(args) => predict_command(args),
        Commands::Checkpoints(args) => checkpoints_command(args),
    }
}

fn train_command(args: TrainArgs) -> Result<()> {
    info!("Loading configuration from: {:?}", args.config);
    let mut config = TrainConfig::from_file(&args.config)?;
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if args.save {
        config.save = true;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    info!("Configuration: {}", serde_json::to_string(&config).context("Failed to show configuration")?);

    let device = Default::default();
    let history = train::<Backend>(&config, &device)?;
    match history.best() {
        Some(best) => info!("Training completed. Best dev F1 {:.2} at epoch {}", best.dev_f1 * 100.0, best.epoch),
        None => info!("Training completed!"),
    }
    Ok(())
}

fn predict_command(args: PredictArgs) -> Result<()> {
    let device = Default::default();
    let options = PredictOptions {
        checkpoint: &args.checkpoint,
        data: &args.data,
        data_size: args.data_size,
        output_dir: args.output_dir.as_deref(),
        outputs: args.outputs.as_deref(),
    };
    let f1 = predict_from_checkpoint::<InferBackend>(&options, &device)?;
    info!("F1: {:.2}", f1 * 100.0);
    Ok(())
}

fn checkpoints_command(args: CheckpointsArgs) -> Result<()> {
    let checkpoints = list_checkpoints(&args.dir)?;
    if checkpoints.is_empty() {
        info!("No checkpoints under {:?}", args.dir);
    }
    for (path, data) in checkpoints {
        let dev = data.dev_f1.map_or_else(|| "-".to_string(), |f1| format!("{:.2}", f1 * 100.0));
        info!("{:?}  kind={}  epoch={}  dev_f1={}", path, data.config.model.kind, data.epoch, dev);
    }
    Ok(())
}
