use std::env;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{EmbeddingError, Result};

pub const DEFAULT_HF_ENDPOINT: &str = "https://huggingface.co";

const MODEL_FILE: &str = "onnx/model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Where models live: `TPUFF_MODEL_DIR`, else `<user cache>/tpuff/models`
pub fn model_dir() -> PathBuf {
    if let Some(path) = env::var_os("TPUFF_MODEL_DIR").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("tpuff")
        .join("models")
}

/// Hub base URL, overridable with `TPUFF_HF_ENDPOINT` for mirrors
pub fn hf_endpoint() -> String {
    env::var("TPUFF_HF_ENDPOINT")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .map_or_else(
            || DEFAULT_HF_ENDPOINT.to_string(),
            |url| url.trim_end_matches('/').to_string(),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

impl ModelAssets {
    /// Local layout for a hub id: `org/name` is stored under `org--name`
    pub fn for_model(model_dir: &Path, model_id: &str) -> Self {
        let root = model_dir.join(model_id.replace('/', "--"));
        Self {
            model_path: root.join(MODEL_FILE),
            tokenizer_path: root.join(TOKENIZER_FILE),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.model_path.exists() && self.tokenizer_path.exists()
    }

    fn files(&self) -> [(&'static str, &Path); 2] {
        [
            (MODEL_FILE, self.model_path.as_path()),
            (TOKENIZER_FILE, self.tokenizer_path.as_path()),
        ]
    }
}

fn validate_model_id(model_id: &str) -> Result<()> {
    let valid = !model_id.is_empty()
        && model_id.split('/').count() <= 2
        && model_id
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
        && model_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(EmbeddingError::Config(format!(
            "'{model_id}' is not a Hugging Face model id (expected org/name)"
        )))
    }
}

/// Make sure both assets of `model_id` exist locally, downloading the
/// missing ones from the hub.
pub async fn ensure_model(
    client: &reqwest::Client,
    endpoint: &str,
    model_dir: &Path,
    model_id: &str,
) -> Result<ModelAssets> {
    validate_model_id(model_id)?;
    let assets = ModelAssets::for_model(model_dir, model_id);
    for (remote, local) in assets.files() {
        if local.exists() {
            continue;
        }
        let url = format!("{endpoint}/{model_id}/resolve/main/{remote}");
        log::info!("Downloading {url}");
        download(client, &url, local).await?;
    }
    Ok(assets)
}

/// Stream `url` into a temp file next to `dest`, then rename into place
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let failed = |message: String| EmbeddingError::Download {
        url: url.to_string(),
        message,
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| EmbeddingError::io(parent, err))?;
    }

    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|err| failed(err.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status().as_u16())));
    }

    let tmp_path = temp_path_for(dest);
    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|err| EmbeddingError::io(&tmp_path, err))?;
    let mut written: u64 = 0;
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(err) => {
                drop(file);
                fs::remove_file(&tmp_path).await.ok();
                return Err(failed(err.to_string()));
            }
        };
        written += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|err| EmbeddingError::io(&tmp_path, err))?;
    }
    file.flush()
        .await
        .map_err(|err| EmbeddingError::io(&tmp_path, err))?;
    drop(file);

    fs::rename(&tmp_path, dest)
        .await
        .map_err(|err| EmbeddingError::io(dest, err))?;
    log::debug!("Saved {} ({written} bytes)", dest.display());
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    PathBuf::from(format!("{}.{ts}.download", path.display()))
}
