// Library exports for the `pasa` binary and integration tests

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod decoder;
pub mod error;
pub mod eval;
pub mod io;
pub mod model;
pub mod training;

// Re-export commonly used types
pub use config::{ModelConfig, ModelKind, TrainConfig};
pub use decoder::Decoder;
pub use error::PasaError;
pub use eval::Eval;
pub use training::{predict_from_checkpoint, train, F1History, PredictOptions, Prediction, Trainer};
