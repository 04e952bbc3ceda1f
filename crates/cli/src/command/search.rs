use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, ValueEnum};
use console::style;
use serde_json::Value;
use tpuff_client::{DistanceMetric, QueryRequest, Row};
use tpuff_embeddings::EmbeddingGenerator;

use super::{client_cache, require_metadata, vector_attribute};
use crate::format::{row_contents, row_id, truncate, MAX_CONTENT_CHARS};
use crate::render::{error_line, spinner, Table};

const POPULAR_MODELS: [(&str, usize); 4] = [
    ("sentence-transformers/all-MiniLM-L6-v2", 384),
    ("sentence-transformers/all-mpnet-base-v2", 768),
    ("BAAI/bge-small-en-v1.5", 384),
    ("BAAI/bge-base-en-v1.5", 768),
];

const MODEL_BROWSER_URL: &str = "https://huggingface.co/models?library=sentence-transformers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    #[value(name = "cosine_distance")]
    CosineDistance,
    #[value(name = "euclidean_squared")]
    EuclideanSquared,
}

impl From<MetricArg> for DistanceMetric {
    fn from(value: MetricArg) -> Self {
        match value {
            MetricArg::CosineDistance => Self::CosineDistance,
            MetricArg::EuclideanSquared => Self::EuclideanSquared,
        }
    }
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text to search for
    pub query: String,

    /// Namespace to search in
    #[arg(short, long)]
    pub namespace: String,

    /// Hugging Face model id for vector search (e.g. sentence-transformers/all-MiniLM-L6-v2)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Number of results to return
    #[arg(short = 'k', long, default_value_t = 10)]
    pub top_k: usize,

    /// Distance metric for vector search
    #[arg(short, long, value_enum, default_value_t = MetricArg::CosineDistance)]
    pub distance_metric: MetricArg,

    /// Additional filters in JSON format
    #[arg(short, long)]
    pub filters: Option<String>,

    /// Field to use for full-text search (BM25)
    #[arg(long = "fts")]
    pub fts_field: Option<String>,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SearchMode {
    FullText { field: String },
    Vector { model: String },
}

impl SearchMode {
    /// `None` when neither a model nor a full-text field was given. Full-text
    /// wins when both are.
    fn select(fts_field: Option<&str>, model: Option<&str>) -> Option<Self> {
        match (fts_field, model) {
            (Some(field), _) => Some(Self::FullText {
                field: field.to_string(),
            }),
            (None, Some(model)) => Some(Self::Vector {
                model: model.to_string(),
            }),
            (None, None) => None,
        }
    }
}

fn parse_filters(raw: Option<&str>) -> serde_json::Result<Option<Value>> {
    raw.map(serde_json::from_str).transpose()
}

pub async fn run(args: SearchArgs) -> Result<ExitCode> {
    let Some(mode) = SearchMode::select(args.fts_field.as_deref(), args.model.as_deref()) else {
        error_line("Either --model or --fts must be specified");
        eprintln!("{}", style("  Use --model for vector similarity search").yellow().for_stderr());
        eprintln!("{}", style("  Use --fts for full-text search").yellow().for_stderr());
        return Ok(ExitCode::FAILURE);
    };
    if args.fts_field.is_some() && args.model.is_some() {
        eprintln!(
            "{}",
            style("Warning: Both --fts and --model specified. Using FTS mode.")
                .yellow()
                .for_stderr()
        );
    }
    let filters = match parse_filters(args.filters.as_deref()) {
        Ok(filters) => filters,
        Err(err) => {
            log::debug!("filter parse error: {err}");
            error_line("Invalid filter JSON format");
            eprintln!(
                "{}",
                style(r#"Example: -f '["category", "In", ["tech", "science"]]'"#)
                    .yellow()
                    .for_stderr()
            );
            return Ok(ExitCode::FAILURE);
        }
    };

    let started = Instant::now();
    let cache = client_cache()?;
    let client = cache.client(args.region.as_deref())?;

    println!(
        "\n{}",
        style(format!("Searching in namespace: {}", args.namespace)).bold()
    );
    println!("{}", style(format!("Query: \"{}\"", args.query)).dim());

    let mut query = match &mode {
        SearchMode::FullText { field } => {
            println!(
                "{}\n",
                style(format!("Mode: Full-text search (BM25) on field \"{field}\"")).dim()
            );
            let mut query = QueryRequest::bm25(field, &args.query, args.top_k);
            if let Some(vector) = client
                .metadata(&args.namespace)
                .await?
                .as_ref()
                .and_then(vector_attribute)
            {
                query = query.excluding(&vector.name);
            }
            query
        }
        SearchMode::Vector { model } => {
            println!("{}", style("Mode: Vector similarity search").dim());
            println!("{}\n", style(format!("Model: {model}")).dim());

            let generator = EmbeddingGenerator::from_env()?;
            let progress = spinner(format!("Generating embedding with {model}..."));
            let generated = generator.generate(&args.query, model).await;
            progress.finish_and_clear();
            let embedding = match generated {
                Ok(embedding) => embedding,
                Err(err) if err.is_model_load() => {
                    log::debug!("model load failed: {err}");
                    print_model_help(&err);
                    return Ok(ExitCode::FAILURE);
                }
                Err(err) => return Err(err.into()),
            };
            println!(
                "{}\n",
                style(format!("Generated {}-dimensional embedding", embedding.len())).dim()
            );

            let metadata = require_metadata(&client, &args.namespace).await?;
            let Some(vector) = vector_attribute(&metadata) else {
                error_line("No vector attribute found in namespace schema");
                return Ok(ExitCode::FAILURE);
            };
            if vector.dimensions != embedding.len() {
                error_line("Dimension mismatch!");
                let warn = |line: String| eprintln!("{}", style(line).yellow().for_stderr());
                warn(format!(
                    "  Expected: {} dimensions (from namespace schema)",
                    vector.dimensions
                ));
                warn(format!(
                    "  Got: {} dimensions (from model {model})",
                    embedding.len()
                ));
                warn(
                    "\nThe namespace may have been created with a different embedding model."
                        .to_string(),
                );
                return Ok(ExitCode::FAILURE);
            }

            let metric = DistanceMetric::from(args.distance_metric);
            println!(
                "{}\n",
                style(format!("Using distance metric: {}", metric.as_str())).dim()
            );
            let mut query =
                QueryRequest::ann(&vector.name, embedding, args.top_k).excluding(&vector.name);
            query.distance_metric = Some(metric);
            query
        }
    };
    query.filters = filters;

    let response = client.query(&args.namespace, &query).await?;
    let elapsed_ms = started.elapsed().as_millis();

    if response.rows.is_empty() {
        println!("{}", style("No documents found matching the query").yellow());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}\n",
        style(format!("Found {} result(s):", response.rows.len())).bold()
    );
    print!("{}", results_table(&mode, &response.rows).render());

    if let Some(performance) = response.performance {
        println!(
            "\n{}",
            style(format!(
                "Search completed in {elapsed_ms}ms (query execution: {:.2}ms)",
                performance.query_execution_ms
            ))
            .dim()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn results_table(mode: &SearchMode, rows: &[Row]) -> Table {
    let score_header = match mode {
        SearchMode::FullText { .. } => "Score",
        SearchMode::Vector { .. } => "Distance",
    };
    let mut table = Table::new(["ID", "Contents", score_header]).align_right(2);

    for row in rows {
        let contents = match mode {
            SearchMode::FullText { field } => match row.get(field) {
                Some(Value::String(text)) => truncate(text, MAX_CONTENT_CHARS),
                Some(other) => truncate(&other.to_string(), MAX_CONTENT_CHARS),
                None => style("N/A").dim().to_string(),
            },
            SearchMode::Vector { .. } => {
                truncate(&row_contents(row, &["$score"]), MAX_CONTENT_CHARS)
            }
        };
        let score = row
            .get("$dist")
            .or_else(|| row.get("dist"))
            .and_then(Value::as_f64)
            .map_or_else(|| style("N/A").dim().to_string(), |d| format!("{d:.4}"));
        table.push_row(vec![row_id(row), contents, score]);
    }
    table
}

fn print_model_help(err: &tpuff_embeddings::EmbeddingError) {
    error_line(format!("Failed to load model: {err}"));
    eprintln!("\n{}", style("Popular embedding models:").dim().for_stderr());
    for (model, dimensions) in POPULAR_MODELS {
        eprintln!(
            "{}",
            style(format!("  • {model} ({dimensions} dimensions)"))
                .dim()
                .for_stderr()
        );
    }
    eprintln!(
        "\n{}\n",
        style(format!("Browse models: {MODEL_BROWSER_URL}"))
            .dim()
            .for_stderr()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn full_text_wins_over_model() {
        assert_eq!(
            SearchMode::select(Some("body"), Some("org/model")),
            Some(SearchMode::FullText {
                field: "body".into()
            })
        );
        assert_eq!(
            SearchMode::select(None, Some("org/model")),
            Some(SearchMode::Vector {
                model: "org/model".into()
            })
        );
        assert_eq!(SearchMode::select(None, None), None);
    }

    #[test]
    fn filters_must_be_json() {
        assert_eq!(parse_filters(None).unwrap(), None);
        assert_eq!(
            parse_filters(Some(r#"["category", "In", ["tech"]]"#)).unwrap(),
            Some(json!(["category", "In", ["tech"]]))
        );
        assert!(parse_filters(Some("[category")).is_err());
    }

    #[test]
    fn result_rows_show_field_or_attributes() {
        let rows: Vec<Row> = vec![
            json!({"id": "a", "body": "hello world", "$dist": 1.23456, "$score": 9})
                .as_object()
                .unwrap()
                .clone(),
            json!({"id": 2, "title": "t"}).as_object().unwrap().clone(),
        ];

        let fts = SearchMode::FullText {
            field: "body".into(),
        };
        let text = console::strip_ansi_codes(&results_table(&fts, &rows).render()).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ID"));
        assert!(lines[0].ends_with("Score"));
        assert!(lines[2].contains("hello world"));
        assert!(lines[2].ends_with("1.2346"));
        assert!(lines[3].ends_with("N/A"));

        let vector = SearchMode::Vector {
            model: "m".into(),
        };
        let text = console::strip_ansi_codes(&results_table(&vector, &rows).render()).to_string();
        assert!(text.lines().next().unwrap().ends_with("Distance"));
        assert!(text.contains(r#"{"body":"hello world"}"#));
        assert!(text.contains(r#"{"title":"t"}"#));
    }
}
