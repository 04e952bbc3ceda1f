use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use console::style;
use tpuff_client::QueryRequest;

use super::client_cache;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Document id
    pub id: String,

    /// Namespace to query
    #[arg(short, long)]
    pub namespace: String,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,
}

pub async fn run(args: GetArgs) -> Result<ExitCode> {
    let cache = client_cache()?;
    let client = cache.client(args.region.as_deref())?;

    println!(
        "\n{}\n",
        style(format!(
            "Querying document with ID: {} from namespace: {}",
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

    println!("{}", style("Document:").cyan());
    println!("{}", serde_json::to_string_pretty(document)?);

    if let Some(performance) = response.performance {
        println!(
            "\n{}",
            style(format!("Query took {:.2}ms", performance.query_execution_ms)).dim()
        );
    }
    Ok(ExitCode::SUCCESS)
}
