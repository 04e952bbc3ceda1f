use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::error::{EmbeddingError, Result};
use crate::models::{ensure_model, hf_endpoint, model_dir};
use crate::onnx::OrtBackend;
use crate::stub::stub_embed;

pub const DEFAULT_STUB_DIMENSION: usize = 384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    Onnx,
    /// Offline deterministic vectors of a fixed dimension
    Stub { dimension: usize },
}

impl EmbeddingMode {
    /// `TPUFF_EMBEDDING_MODE` (`onnx` | `stub`) and `TPUFF_STUB_DIMENSION`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = lookup("TPUFF_EMBEDDING_MODE")
            .unwrap_or_else(|| "onnx".to_string())
            .to_ascii_lowercase();
        match raw.trim() {
            "" | "onnx" => Ok(Self::Onnx),
            "stub" => {
                let dimension = match lookup("TPUFF_STUB_DIMENSION") {
                    Some(value) => value
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|dim| *dim > 0)
                        .ok_or_else(|| {
                            EmbeddingError::Config(format!(
                                "TPUFF_STUB_DIMENSION must be a positive integer, got '{value}'"
                            ))
                        })?,
                    None => DEFAULT_STUB_DIMENSION,
                };
                Ok(Self::Stub { dimension })
            }
            other => Err(EmbeddingError::Config(format!(
                "Unsupported TPUFF_EMBEDDING_MODE '{other}' (expected 'onnx' or 'stub')"
            ))),
        }
    }
}

/// Turns query text into vectors, loading each model at most once.
///
/// Owned by one command invocation; nothing is cached process-wide.
pub struct EmbeddingGenerator {
    mode: EmbeddingMode,
    model_dir: PathBuf,
    endpoint: String,
    http: reqwest::Client,
    models: Mutex<HashMap<String, Arc<OrtBackend>>>,
}

impl EmbeddingGenerator {
    pub fn new(mode: EmbeddingMode, model_dir: PathBuf, endpoint: impl Into<String>) -> Self {
        Self {
            mode,
            model_dir,
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(EmbeddingMode::from_env()?, model_dir(), hf_endpoint()))
    }

    pub fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    /// Unit-length embedding of `text` with `model_id`
    pub async fn generate(&self, text: &str, model_id: &str) -> Result<Vec<f32>> {
        if let EmbeddingMode::Stub { dimension } = self.mode {
            return Ok(stub_embed(text, dimension));
        }

        let backend = self.backend(model_id).await?;
        let texts = vec![text.to_string()];
        let mut vectors = spawn_blocking(move || backend.embed_blocking(&texts))
            .await
            .map_err(|e| EmbeddingError::Inference(format!("Join error: {e}")))??;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Inference("Empty embedding result".to_string()))
    }

    async fn backend(&self, model_id: &str) -> Result<Arc<OrtBackend>> {
        // Held across the load so concurrent callers wait for one load.
        let mut models = self.models.lock().await;
        if let Some(backend) = models.get(model_id) {
            return Ok(Arc::clone(backend));
        }

        let assets = ensure_model(&self.http, &self.endpoint, &self.model_dir, model_id).await?;
        let id = model_id.to_string();
        let backend = spawn_blocking(move || OrtBackend::load(&id, &assets))
            .await
            .map_err(|e| EmbeddingError::ModelLoad {
                model: model_id.to_string(),
                message: format!("Join error: {e}"),
            })??;
        let backend = Arc::new(backend);
        models.insert(model_id.to_string(), Arc::clone(&backend));
        Ok(backend)
    }

    /// Number of models loaded so far
    pub async fn loaded_models(&self) -> usize {
        self.models.lock().await.len()
    }
}
