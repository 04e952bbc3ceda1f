//! # tpuff embeddings
//!
//! Local query embeddings for vector search against turbopuffer.
//!
//! ```text
//! model id ──> TPUFF_MODEL_DIR/<org--name>/{onnx/model.onnx, tokenizer.json}
//!                 │ (downloaded from the hub when missing)
//!                 ▼
//!   tokenizer ──> ONNX Runtime ──> mean pool ──> L2 normalize ──> Vec<f32>
//! ```
//!
//! Set `TPUFF_EMBEDDING_MODE=stub` for deterministic vectors without any
//! model (dimension from `TPUFF_STUB_DIMENSION`, default 384).

mod error;
mod generator;
mod models;
mod onnx;
mod stub;

pub use error::{EmbeddingError, Result};
pub use generator::{EmbeddingGenerator, EmbeddingMode, DEFAULT_STUB_DIMENSION};
pub use models::{ensure_model, hf_endpoint, model_dir, ModelAssets, DEFAULT_HF_ENDPOINT};
pub use stub::stub_embed;
