use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use console::style;
use tpuff_client::TurbopufferClient;

use super::client_cache;
use crate::prompt::{ask, is_yes};
use crate::render::{error_line, hint_line, spinner};

/// Word that unlocks `delete --all`
const DELETE_ALL_PASSPHRASE: &str = "yolo";

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Namespace to delete
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Delete all namespaces
    #[arg(long = "all")]
    pub all: bool,

    /// Delete all namespaces starting with prefix (case-insensitive)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DeleteTarget {
    Namespace(String),
    All,
    Prefix(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionError {
    Missing,
    Conflicting,
}

impl DeleteTarget {
    fn from_args(args: &DeleteArgs) -> Result<Self, SelectionError> {
        let namespace = args.namespace.as_ref().filter(|n| !n.is_empty());
        let prefix = args.prefix.as_ref().filter(|p| !p.is_empty());
        let chosen = usize::from(namespace.is_some())
            + usize::from(args.all)
            + usize::from(prefix.is_some());
        match chosen {
            0 => Err(SelectionError::Missing),
            1 => Ok(match (namespace, prefix) {
                (Some(namespace), _) => Self::Namespace(namespace.clone()),
                (_, Some(prefix)) => Self::Prefix(prefix.clone()),
                _ => Self::All,
            }),
            _ => Err(SelectionError::Conflicting),
        }
    }
}

/// Namespaces whose id starts with `prefix`, ignoring case
fn matching_prefix(ids: &[String], prefix: &str) -> Vec<String> {
    let prefix = prefix.to_lowercase();
    ids.iter()
        .filter(|id| id.to_lowercase().starts_with(&prefix))
        .cloned()
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DeleteTally {
    deleted: usize,
    failed: usize,
}

impl DeleteTally {
    fn print(&self) {
        println!("{}", style(format!("Successfully deleted: {}", self.deleted)).dim());
        if self.failed > 0 {
            println!("{}", style(format!("Failed: {}", self.failed)).red());
        }
    }

    fn exit_code(&self) -> ExitCode {
        if self.failed > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

/// Delete one after another; a failure is reported and the rest continue
async fn delete_each(client: &TurbopufferClient, ids: &[String]) -> DeleteTally {
    let mut tally = DeleteTally::default();
    for id in ids {
        match client.delete_namespace(id).await {
            Ok(()) => {
                println!("{}", style(format!("  ✓ Deleted: {id}")).dim());
                tally.deleted += 1;
            }
            Err(err) => {
                log::debug!("delete of '{id}' failed: {err:?}");
                println!("{}", style(format!("  ✗ Failed to delete: {id}")).red());
                println!("{}", style(format!("    Error: {err}")).dim());
                tally.failed += 1;
            }
        }
    }
    tally
}

pub async fn run(args: DeleteArgs) -> Result<ExitCode> {
    let target = match DeleteTarget::from_args(&args) {
        Ok(target) => target,
        Err(SelectionError::Missing) => {
            error_line("You must specify either -n <namespace>, --all, or --prefix <prefix>");
            eprintln!("\nUsage:");
            eprintln!("  tpuff delete -n <namespace>       Delete a specific namespace");
            eprintln!("  tpuff delete --all                Delete all namespaces");
            eprintln!("  tpuff delete --prefix <prefix>    Delete all namespaces starting with prefix");
            return Ok(ExitCode::FAILURE);
        }
        Err(SelectionError::Conflicting) => {
            error_line("Cannot use multiple deletion options together");
            hint_line("Please use only one of: -n, --all, or --prefix");
            return Ok(ExitCode::FAILURE);
        }
    };

    let cache = client_cache()?;
    let client = cache.client(args.region.as_deref())?;
    match target {
        DeleteTarget::Namespace(namespace) => delete_one(&client, &namespace).await,
        DeleteTarget::All => delete_all(&client).await,
        DeleteTarget::Prefix(prefix) => delete_prefix(&client, &prefix).await,
    }
}

async fn delete_one(client: &TurbopufferClient, namespace: &str) -> Result<ExitCode> {
    println!(
        "\n{}",
        style(format!("⚠️  You are about to delete namespace: {namespace}")).yellow()
    );
    println!("{}\n", style("This action cannot be undone.").dim());

    if !is_yes(&ask("Are you sure? (y/n)")?) {
        println!("{}", style("Deletion cancelled.").dim());
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", style(format!("Deleting namespace {namespace}...")).dim());
    client.delete_namespace(namespace).await?;
    println!(
        "{}",
        style(format!("✓ Namespace {namespace} deleted successfully!")).green()
    );
    Ok(ExitCode::SUCCESS)
}

async fn delete_all(client: &TurbopufferClient) -> Result<ExitCode> {
    println!("{}", style("\n🚨 DANGER ZONE 🚨").yellow().bold());
    println!("{}", style("You are about to delete ALL namespaces!").red());
    println!("{}\n", style("This will permanently destroy all your data.").dim());

    let progress = spinner("Listing namespaces...");
    let listed = client.list_namespaces(None).await;
    progress.finish_and_clear();
    let namespaces = listed?;

    if namespaces.is_empty() {
        println!("{}", style("No namespaces found. Nothing to delete.").dim());
        return Ok(ExitCode::SUCCESS);
    }
    print_targets(&format!("Found {} namespace(s):", namespaces.len()), &namespaces);

    println!(
        "\n{}",
        style("💀 This is your last chance to back out! 💀").yellow().bold()
    );
    println!(
        "{} {}\n",
        style("To confirm, please type:").dim(),
        style(DELETE_ALL_PASSPHRASE).red().bold()
    );
    if ask(">")? != DELETE_ALL_PASSPHRASE {
        println!(
            "\n{}",
            style("✨ Wise choice! Your data lives to see another day.").green()
        );
        println!("{}", style("(Phew, that was close!)").dim());
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}", style("🎢 YOLO MODE ACTIVATED! 🎢").red().bold());
    println!("{}\n", style("Deleting all namespaces...").dim());
    let tally = delete_each(client, &namespaces).await;

    println!("\n{}", style("🎉 Deletion complete!").green().bold());
    tally.print();
    Ok(tally.exit_code())
}

async fn delete_prefix(client: &TurbopufferClient, prefix: &str) -> Result<ExitCode> {
    println!(
        "\n{}",
        style(format!("🔍 Searching for namespaces with prefix: {prefix}")).yellow()
    );
    println!("{}\n", style("(Using case-insensitive matching)").dim());

    let progress = spinner("Listing namespaces...");
    let listed = client.list_namespaces(None).await;
    progress.finish_and_clear();
    let matching = matching_prefix(&listed?, prefix);

    if matching.is_empty() {
        println!(
            "{}",
            style(format!("No namespaces found with prefix \"{prefix}\".")).dim()
        );
        println!("{}", style("Nothing to delete.").dim());
        return Ok(ExitCode::SUCCESS);
    }
    print_targets(
        &format!(
            "Found {} namespace(s) matching prefix \"{prefix}\":",
            matching.len()
        ),
        &matching,
    );

    println!(
        "\n{}",
        style("⚠️  WARNING: This will permanently delete these namespaces!")
            .yellow()
            .bold()
    );
    println!(
        "{} {}\n",
        style("To confirm, please type the prefix:").dim(),
        style(prefix).red().bold()
    );
    if ask(">")?.to_lowercase() != prefix.to_lowercase() {
        println!("\n{}", style("✨ Deletion cancelled.").green());
        println!("{}", style("Your data is safe!").dim());
        return Ok(ExitCode::SUCCESS);
    }

    println!("\n{}\n", style("🗑️  Starting deletion...").red().bold());
    let tally = delete_each(client, &matching).await;

    println!("\n{}", style("✓ Deletion complete!").green().bold());
    tally.print();
    Ok(tally.exit_code())
}

fn print_targets(heading: &str, ids: &[String]) {
    println!("{}", style(heading).yellow());
    for id in ids {
        println!("{}", style(format!("  - {id}")).dim());
    }
}
