//! # tpuff
//!
//! Command line interface for turbopuffer.
//!
//! ```text
//! tpuff <command>
//!   │
//!   ├─ list / search / get / edit / delete ──> tpuff-client (REST)
//!   │                     └─ search -m ──────> tpuff-embeddings (ONNX)
//!   ├─ schema get / apply / copy ────────────> tpuff-schema (reconcile) ──> TurbopufferStore
//!   └─ export ──> refresh loop ──> prometheus registry ──> hyper (/metrics, /health, /)
//! ```
//!
//! Connection settings come from `TURBOPUFFER_API_KEY`,
//! `TURBOPUFFER_REGION` and `TURBOPUFFER_BASE_URL`.

use std::env;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

mod command;
mod exporter;
mod format;
mod prompt;
mod render;

use command::delete::DeleteArgs;
use command::edit::EditArgs;
use command::export::ExportArgs;
use command::get::GetArgs;
use command::list::ListArgs;
use command::schema::SchemaCommand;
use command::search::SearchArgs;

#[derive(Parser)]
#[command(name = "tpuff")]
#[command(about = "CLI for the turbopuffer vector database", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug output (also DEBUG=1)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List namespaces, or documents in a namespace
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Search a namespace by vector similarity or full-text
    Search(SearchArgs),

    /// Fetch one document by id
    Get(GetArgs),

    /// Edit a document in $EDITOR and upsert the result
    Edit(EditArgs),

    /// Delete namespaces
    #[command(visible_alias = "rm")]
    Delete(DeleteArgs),

    /// Run a Prometheus exporter for namespace metrics
    #[command(visible_alias = "metrics")]
    Export(ExportArgs),

    /// Manage namespace schemas
    #[command(subcommand)]
    Schema(SchemaCommand),
}

pub async fn main_entry() -> ExitCode {
    let cli = Cli::parse();
    let debug = cli.debug || debug_from_env();
    init_logging(debug);
    log::debug!("tpuff {} starting", env!("CARGO_PKG_VERSION"));

    let outcome = match cli.command {
        Commands::List(args) => command::list::run(args).await,
        Commands::Search(args) => command::search::run(args).await,
        Commands::Get(args) => command::get::run(args).await,
        Commands::Edit(args) => command::edit::run(args).await,
        Commands::Delete(args) => command::delete::run(args).await,
        Commands::Export(args) => command::export::run(args).await,
        Commands::Schema(cmd) => command::schema::run(cmd).await,
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", style(format!("Error: {err:#}")).red().for_stderr());
            ExitCode::FAILURE
        }
    }
}

fn debug_from_env() -> bool {
    env::var("DEBUG")
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        for module in ["tpuff_cli", "tpuff_client", "tpuff_schema", "tpuff_embeddings"] {
            builder.filter_module(module, log::LevelFilter::Debug);
        }
    } else {
        // ONNX Runtime logs every session option at info level
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();
}
