mod history;
mod pipeline;
mod predict;
#[cfg(test)]
mod scaled;
mod trainer;

pub use history::{F1History, HistoryEntry};
pub use pipeline::{predict_from_checkpoint, prepare_data, train, PredictOptions, PreparedData, Split};
pub use predict::{
    eval_one_epoch, evaluate_predictions, outputs_by_sentence, predict_one_epoch, Prediction, Predictor, Reranker,
    Stacker,
};
pub use trainer::{build_optimizer, Trainer};
