use std::collections::HashMap;
use std::sync::Mutex;

use ndarray::{Array, Axis, Ix2, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::error::{EmbeddingError, Result};
use crate::models::ModelAssets;

const MAX_LENGTH: usize = 512;

/// Sentence-transformer style model: tokenizer, ONNX forward pass, mean
/// pooling over the attention mask, L2 normalization
pub struct OrtBackend {
    model_id: String,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OrtBackend {
    pub fn load(model_id: &str, assets: &ModelAssets) -> Result<Self> {
        let load_err = |message: String| EmbeddingError::ModelLoad {
            model: model_id.to_string(),
            message,
        };

        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let mut tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| load_err(format!("tokenizer: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_LENGTH,
                ..TruncationParams::default()
            }))
            .map_err(|e| load_err(format!("tokenizer truncation: {e}")))?;

        let session = Session::builder()
            .map_err(|e| load_err(format!("{e}")))?
            .with_intra_threads(default_intra_threads())
            .map_err(|e| load_err(format!("Failed to set ORT intra threads: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(format!("Failed to set optimization level: {e}")))?
            .commit_from_file(&assets.model_path)
            .map_err(|e| load_err(format!("Failed to load ONNX model: {e}")))?;

        log::info!("Loaded ONNX model '{model_id}'");
        Ok(Self {
            model_id: model_id.to_string(),
            session: Mutex::new(session),
            tokenizer,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Inference(format!("Tokenization failed: {e}")))?;
        if encodings.is_empty() {
            return Ok(Vec::new());
        }

        let seq_len = encodings[0].len();
        if encodings.iter().any(|e| e.len() != seq_len) {
            return Err(EmbeddingError::Inference(
                "Inconsistent sequence lengths after padding".to_string(),
            ));
        }
        let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);
        let shape = (encodings.len(), seq_len);

        let mut available: HashMap<&str, DynTensor> = HashMap::new();
        for (name, data) in [
            ("input_ids", ids),
            ("attention_mask", masks),
            ("token_type_ids", type_ids),
        ] {
            let array = Array::from_shape_vec(shape, data)
                .map_err(|e| EmbeddingError::Inference(format!("{name} shape error: {e}")))?;
            let tensor = Tensor::from_array(array.into_dyn())
                .map_err(|e| EmbeddingError::Inference(format!("{e}")))?
                .upcast();
            available.insert(name, tensor);
        }

        let array = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| EmbeddingError::Inference("Failed to lock ONNX session".into()))?;

            let mut feed: HashMap<String, DynTensor> = HashMap::new();
            for input in &session.inputs {
                let tensor = available.remove(input.name.as_str()).ok_or_else(|| {
                    EmbeddingError::Inference(format!("Unsupported ONNX input '{}'", input.name))
                })?;
                feed.insert(input.name.clone(), tensor);
            }

            let outputs = session
                .run(SessionInputs::from(feed))
                .map_err(|e| EmbeddingError::Inference(format!("ONNX forward failed: {e}")))?;
            if outputs.len() == 0 {
                return Err(EmbeddingError::Inference(
                    "ONNX returned no outputs".to_string(),
                ));
            }
            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| {
                    EmbeddingError::Inference(format!("Failed to decode ONNX output: {e}"))
                })?
                .to_owned()
        };

        embeddings_from_output(array, &mask_rows)
    }
}

fn default_intra_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(1)
}

/// Rank 2 outputs are already pooled; rank 3 outputs are token states
pub(crate) fn embeddings_from_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
) -> Result<Vec<Vec<f32>>> {
    let bad_shape = |e: ndarray::ShapeError| EmbeddingError::Inference(format!("Bad output shape: {e}"));
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let pooled = array.into_dimensionality::<Ix2>().map_err(bad_shape)?;
            for row in pooled.outer_iter() {
                let mut emb = row.to_vec();
                normalize(&mut emb);
                out.push(emb);
            }
        }
        3 => {
            let hidden = array.into_dimensionality::<Ix3>().map_err(bad_shape)?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let attn = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample.view(), &attn);
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(EmbeddingError::Inference(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )))
        }
    }
    Ok(out)
}

pub(crate) fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    if sample.is_empty() {
        return vec![];
    }

    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let encoding_masks = encoding.get_attention_mask();
        for idx in 0..seq_len {
            ids.push(i64::from(*encoding.get_ids().get(idx).unwrap_or(&0)));
            masks.push(i64::from(*encoding_masks.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*encoding.get_type_ids().get(idx).unwrap_or(&0)));
        }
        mask_rows.push(
            encoding_masks
                .iter()
                .take(seq_len)
                .map(|v| i64::from(*v))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}
