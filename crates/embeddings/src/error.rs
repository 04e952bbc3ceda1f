use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Invalid embedding configuration: {0}")]
    Config(String),

    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load model {model}: {message}")]
    ModelLoad { model: String, message: String },

    #[error("Embedding error: {0}")]
    Inference(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

impl EmbeddingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the failure happened while fetching or opening a model,
    /// as opposed to running it
    pub fn is_model_load(&self) -> bool {
        matches!(
            self,
            Self::Download { .. } | Self::ModelLoad { .. } | Self::Io { .. }
        )
    }
}
