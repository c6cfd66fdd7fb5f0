use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the PASA library layers.
#[derive(Debug, Error)]
pub enum PasaError {
    /// A corpus line could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    Corpus {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The training loss became NaN or infinite.
    #[error("NLL is not finite at batch index {index}: {value}")]
    NonFiniteLoss { index: usize, value: f32 },

    #[error("label {0:?} is missing from the label vocabulary")]
    MissingLabel(String),

    /// Values could not be read back from a backend tensor.
    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, PasaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_error_names_file_and_line() {
        let err = PasaError::Corpus {
            path: PathBuf::from("train/ntc.txt"),
            line: 12,
            message: "bad chunk header".into(),
        };
        assert_eq!(err.to_string(), "train/ntc.txt:12: bad chunk header");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PasaError>();
    }
}
