use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use console::style;
use tpuff_client::{
    fetch_namespaces_with_metadata, ClientCache, NamespaceWithMetadata, QueryRequest, RegionScope,
};

use super::{client_cache, require_metadata, vector_attribute};
use crate::format::{
    format_bytes, format_count, format_recall, format_updated_at, row_contents, row_id, truncate,
    updated_at_key, MAX_CONTENT_CHARS,
};
use crate::render::{error_line, hint_line, spinner, Table};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Namespace to list documents from
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Number of documents to return
    #[arg(short = 'k', long, default_value_t = 10)]
    pub top_k: usize,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Query all regions (includes recall)
    #[arg(short = 'A', long = "all")]
    pub all_regions: bool,

    /// Include recall estimation (slower)
    #[arg(long = "recall")]
    pub include_recall: bool,
}

pub async fn run(args: ListArgs) -> Result<ExitCode> {
    if args.all_regions && args.region.is_some() {
        error_line("Cannot use both --all and --region flags together");
        hint_line(
            "Please use either --all to query all regions, or --region to specify a single region",
        );
        return Ok(ExitCode::FAILURE);
    }

    if let Some(namespace) = &args.namespace {
        if args.all_regions {
            error_line("--all flag is not supported when querying a specific namespace");
            hint_line("Please specify a region with -r <region> to query documents in a namespace");
            return Ok(ExitCode::FAILURE);
        }
        let cache = client_cache()?;
        return list_documents(&cache, namespace, args.top_k, args.region.as_deref()).await;
    }

    let cache = client_cache()?;
    let scope = if args.all_regions {
        RegionScope::All
    } else {
        RegionScope::Single(args.region.clone())
    };
    list_namespaces(&cache, &scope, args.include_recall || args.all_regions).await
}

async fn list_namespaces(
    cache: &ClientCache,
    scope: &RegionScope,
    include_recall: bool,
) -> Result<ExitCode> {
    let progress = spinner("Fetching namespaces...");
    let fetched = fetch_namespaces_with_metadata(cache, scope, include_recall).await;
    progress.finish_and_clear();
    let mut namespaces = fetched?;

    if namespaces.is_empty() {
        println!("No namespaces found");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "\n{}\n",
        style(format!("Found {} namespace(s):", namespaces.len())).bold()
    );
    sort_by_updated(&mut namespaces);
    let table = namespace_table(&namespaces, *scope == RegionScope::All, include_recall);
    print!("{}", table.render());
    Ok(ExitCode::SUCCESS)
}

/// Most recently updated first; namespaces without a usable timestamp last
fn sort_by_updated(namespaces: &mut [NamespaceWithMetadata]) {
    namespaces.sort_by_cached_key(|ns| {
        std::cmp::Reverse(updated_at_key(
            ns.metadata.as_ref().and_then(|m| m.updated_at.as_deref()),
        ))
    });
}

fn namespace_table(
    namespaces: &[NamespaceWithMetadata],
    show_region: bool,
    show_recall: bool,
) -> Table {
    let mut headers = vec!["Namespace"];
    if show_region {
        headers.push("Region");
    }
    headers.extend(["Rows", "Logical Bytes", "Index Status", "Unindexed Bytes"]);
    if show_recall {
        headers.push("Recall");
    }
    headers.push("Updated");

    let rows_column = usize::from(show_region) + 1;
    let mut table = Table::new(headers)
        .align_right(rows_column)
        .align_right(rows_column + 1)
        .align_right(rows_column + 3);
    let na = || style("N/A").dim().to_string();

    for ns in namespaces {
        let mut row = vec![style(&ns.namespace_id).bold().to_string()];
        if show_region {
            row.push(ns.region.as_deref().map_or_else(na, |r| style(r).dim().to_string()));
        }

        match &ns.metadata {
            Some(metadata) => {
                let status = if metadata.index_status() == "up-to-date" {
                    style("up-to-date").green().to_string()
                } else {
                    style("updating").red().to_string()
                };
                let unindexed = metadata.unindexed_bytes();
                let unindexed = if unindexed > 0 {
                    style(format_bytes(unindexed)).red().to_string()
                } else {
                    format_bytes(0)
                };
                row.extend([
                    format_count(metadata.approx_row_count),
                    format_bytes(metadata.approx_logical_bytes),
                    status,
                    unindexed,
                ]);
                if show_recall {
                    row.push(format_recall(ns.recall.as_ref()));
                }
                row.push(
                    metadata
                        .updated_at
                        .as_deref()
                        .map_or_else(na, format_updated_at),
                );
            }
            None => {
                row.extend(std::iter::repeat_with(na).take(4));
                if show_recall {
                    row.push(na());
                }
                row.push(na());
            }
        }
        table.push_row(row);
    }
    table
}

async fn list_documents(
    cache: &ClientCache,
    namespace: &str,
    top_k: usize,
    region: Option<&str>,
) -> Result<ExitCode> {
    let client = cache.client(region)?;
    println!(
        "\n{}\n",
        style(format!("Querying namespace: {namespace} (top {top_k} results)")).bold()
    );

    let metadata = require_metadata(&client, namespace).await?;
    let Some(vector) = vector_attribute(&metadata) else {
        error_line("No vector attribute found in namespace schema");
        return Ok(ExitCode::FAILURE);
    };
    println!(
        "{}\n",
        style(format!(
            "Using {}-dimensional zero vector for query",
            vector.dimensions
        ))
        .dim()
    );

    let query = QueryRequest::ann(&vector.name, vec![0.0; vector.dimensions], top_k)
        .excluding(&vector.name);
    let response = client.query(namespace, &query).await?;

    if response.rows.is_empty() {
        println!("No documents found in namespace");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}\n",
        style(format!("Found {} document(s):", response.rows.len())).bold()
    );
    let mut table = Table::new(["ID", "Contents"]);
    for row in &response.rows {
        table.push_row(vec![
            row_id(row),
            truncate(&row_contents(row, &[]), MAX_CONTENT_CHARS),
        ]);
    }
    print!("{}", table.render());

    if let Some(performance) = response.performance {
        println!(
            "\n{}",
            style(format!("Query took {:.2}ms", performance.query_execution_ms)).dim()
        );
    }
    Ok(ExitCode::SUCCESS)
}
