use std::env;
use std::io::Write;
use std::process::{Command, ExitCode};

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use serde_json::Value;
use tpuff_client::{QueryRequest, Row, WriteRequest};

use super::client_cache;
use crate::render::error_line;

const DEFAULT_EDITOR: &str = "vim";

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Document id
    pub id: String,

    /// Namespace to query
    #[arg(short, long)]
    pub namespace: String,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,
}

/// Document as shown in the editor; the vector is held back and restored
#[derive(Debug, Clone, PartialEq)]
struct EditSession {
    id: Value,
    vector: Option<Value>,
    original: String,
}

impl EditSession {
    fn start(document: &Row, fallback_id: &str) -> Result<Self> {
        let mut editable = document.clone();
        let vector = editable.remove("vector");
        let id = document
            .get("id")
            .cloned()
            .unwrap_or_else(|| Value::String(fallback_id.to_string()));
        Ok(Self {
            id,
            vector,
            original: serde_json::to_string_pretty(&editable)?,
        })
    }

    /// Row to upsert, or `None` when the text was not touched
    fn finish(&self, edited: &str) -> Result<Option<Value>> {
        if edited == self.original {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(edited).context("Invalid JSON format")?;
        let Value::Object(mut document) = value else {
            bail!("Invalid JSON format: the document must be a JSON object");
        };
        if let Some(vector) = &self.vector {
            document.insert("vector".to_string(), vector.clone());
        }
        document.insert("id".to_string(), self.id.clone());
        Ok(Some(Value::Object(document)))
    }
}

/// `$EDITOR` split into program and leading arguments (`code --wait`)
fn editor_command() -> (String, Vec<String>) {
    let raw = env::var("EDITOR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string());
    let mut parts = raw.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_else(|| DEFAULT_EDITOR.to_string());
    (program, parts.collect())
}

pub async fn run(args: EditArgs) -> Result<ExitCode> {
    let cache = client_cache()?;
    let client = cache.client(args.region.as_deref())?;

    println!(
        "\n{}\n",
        style(format!(
            "Fetching document with ID: {} from namespace: {}",
            args.id, args.namespace
        ))
        .bold()
    );
    let response = client
        .query(&args.namespace, &QueryRequest::by_id(&args.id))
        .await?;
    let Some(document) = response.rows.first() else {
        println!("{}", style("Document not found").yellow());
        return Ok(ExitCode::FAILURE);
    };

    let session = EditSession::start(document, &args.id)?;
    let mut file = tempfile::Builder::new()
        .prefix("tpuff-")
        .suffix(".json")
        .tempfile()
        .context("Failed to create temporary file")?;
    file.write_all(session.original.as_bytes())?;
    file.flush()?;

    let (program, editor_args) = editor_command();
    println!("{}", style(format!("Opening {program} editor...")).cyan());
    println!(
        "{}\n",
        style("Save and quit to upsert changes, or quit without saving to cancel.").dim()
    );
    let status = match Command::new(&program)
        .args(&editor_args)
        .arg(file.path())
        .status()
    {
        Ok(status) => status,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            error_line(format!(
                "{program} not found. Install it or point $EDITOR at another editor."
            ));
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err).context(format!("Failed to start {program}")),
    };
    if !status.success() {
        error_line(format!(
            "{program} exited with code {}",
            status.code().map_or_else(|| "unknown".to_string(), |c| c.to_string())
        ));
        return Ok(ExitCode::FAILURE);
    }

    let edited = std::fs::read_to_string(file.path()).context("Failed to read edited document")?;
    let row = match session.finish(&edited) {
        Ok(Some(row)) => row,
        Ok(None) => {
            println!("\n{}", style("No changes made. Skipping upsert.").yellow());
            return Ok(ExitCode::SUCCESS);
        }
        Err(err) => {
            error_line(format!("{err:#}"));
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("\n{}", style("Upserting document...").cyan());
    let write = WriteRequest {
        upsert_rows: vec![row],
        ..WriteRequest::default()
    };
    client.write(&args.namespace, &write).await?;
    println!("{}", style("✓ Document updated successfully").green());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn document() -> Row {
        json!({"id": 7, "title": "draft", "vector": [0.1, 0.2]})
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn vector_is_hidden_from_the_editor() {
        let session = EditSession::start(&document(), "7").unwrap();
        assert_eq!(session.original, "{\n  \"id\": 7,\n  \"title\": \"draft\"\n}");
        assert_eq!(session.vector, Some(json!([0.1, 0.2])));
    }

    #[test]
    fn untouched_text_means_no_upsert() {
        let session = EditSession::start(&document(), "7").unwrap();
        assert_eq!(session.finish(&session.original.clone()).unwrap(), None);
    }

    #[test]
    fn edits_keep_vector_and_id() {
        let session = EditSession::start(&document(), "7").unwrap();
        let row = session
            .finish(r#"{"id": 99, "title": "final"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(row, json!({"id": 7, "title": "final", "vector": [0.1, 0.2]}));
    }

    #[test]
    fn broken_json_is_rejected() {
        let session = EditSession::start(&document(), "7").unwrap();
        assert!(session.finish("{ nope").is_err());
        assert!(session.finish("[1, 2]").is_err());
    }
}
