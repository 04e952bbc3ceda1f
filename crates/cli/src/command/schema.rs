use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;
use serde_json::{json, Value};
use tpuff_client::{ClientCache, TurbopufferStore};
use tpuff_schema::{
    resolve_targets, ApplyOptions, ApplyOutcome, BatchApplyResult, BatchOptions, BatchOutcome,
    BatchPlan, BatchReport, CopyOutcome, CopyPlan, DiffEntry, Schema, SchemaApplier, SchemaDiff,
    SummaryPhase, TargetSelector, TargetStatus,
};

use super::{client_cache, exit_code};
use crate::prompt::TerminalConfirm;
use crate::render::{error_line, hint_line, spinner, Table};

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Display the schema for a namespace
    Get(GetArgs),

    /// Apply a schema file to one or more namespaces
    ///
    /// Only additive changes are allowed: new attributes can be added, but
    /// the type of an existing attribute cannot change.
    Apply(ApplyArgs),

    /// Copy a namespace's schema into a new, empty namespace
    Copy(CopyArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Namespace to get schema from
    #[arg(short, long)]
    pub namespace: String,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Output raw JSON without formatting (for piping)
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Target namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Apply to every namespace starting with this prefix (case-sensitive)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Apply to every namespace
    #[arg(long = "all")]
    pub all: bool,

    /// JSON file containing the schema
    #[arg(short, long = "file")]
    pub file: PathBuf,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,

    /// Apply to the namespaces without conflicts and skip the rest
    #[arg(long)]
    pub continue_on_conflicts: bool,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Source namespace
    #[arg(short, long)]
    pub namespace: String,

    /// Target namespace to create
    #[arg(long = "to")]
    pub target: String,

    /// Override the region (e.g. aws-us-east-1, gcp-us-central1)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

pub async fn run(command: SchemaCommand) -> Result<ExitCode> {
    match command {
        SchemaCommand::Get(args) => get(args).await,
        SchemaCommand::Apply(args) => apply(args).await,
        SchemaCommand::Copy(args) => copy(args).await,
    }
}

async fn get(args: GetArgs) -> Result<ExitCode> {
    let fetched = async {
        let cache = client_cache()?;
        let client = cache.client(args.region.as_deref())?;
        anyhow::Ok(client.metadata(&args.namespace).await?)
    }
    .await;

    let metadata = match fetched {
        Ok(metadata) => metadata,
        Err(err) if args.raw => {
            eprintln!("{}", json!({ "error": format!("{err:#}") }));
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err),
    };
    let schema = metadata.map(|m| m.schema).unwrap_or_default();

    if args.raw {
        println!("{}", Value::Object(schema));
        return Ok(ExitCode::SUCCESS);
    }
    if schema.is_empty() {
        println!(
            "{}",
            style(format!("No schema found for namespace: {}", args.namespace)).yellow()
        );
        return Ok(ExitCode::SUCCESS);
    }
    println!(
        "\n{}\n",
        style(format!("Schema for namespace: {}", args.namespace)).bold()
    );
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeError {
    Missing,
    Conflicting,
}

fn target_selector(args: &ApplyArgs) -> Result<TargetSelector, ModeError> {
    let namespace = args.namespace.as_ref().filter(|n| !n.is_empty());
    let prefix = args.prefix.as_ref().filter(|p| !p.is_empty());
    let chosen = usize::from(namespace.is_some()) + usize::from(prefix.is_some()) + usize::from(args.all);
    match (chosen, namespace, prefix) {
        (0, _, _) => Err(ModeError::Missing),
        (1, Some(namespace), _) => Ok(TargetSelector::Namespace(namespace.clone())),
        (1, _, Some(prefix)) => Ok(TargetSelector::Prefix(prefix.clone())),
        (1, _, _) => Ok(TargetSelector::All),
        _ => Err(ModeError::Conflicting),
    }
}

async fn apply(args: ApplyArgs) -> Result<ExitCode> {
    let selector = match target_selector(&args) {
        Ok(selector) => selector,
        Err(err) => {
            error_line(match err {
                ModeError::Missing => "Must specify one of --namespace, --prefix, or --all",
                ModeError::Conflicting => "Cannot use more than one of --namespace, --prefix, and --all",
            });
            hint_line(
                "Use -n/--namespace for a single namespace, --prefix for prefix match, \
                 or --all for all namespaces",
            );
            return Ok(ExitCode::FAILURE);
        }
    };

    let desired = match Schema::load_file(&args.file) {
        Ok(schema) => schema,
        Err(err) => {
            error_line(err);
            return Ok(ExitCode::FAILURE);
        }
    };
    if desired.is_empty() {
        println!("{}", style("Schema file is empty, nothing to apply").yellow());
        return Ok(ExitCode::SUCCESS);
    }

    let cache = client_cache()?;
    let store = TurbopufferStore::new(cache.client(args.region.as_deref())?);
    let applier = schema_applier(&store, &cache);

    match selector {
        TargetSelector::Namespace(namespace) => {
            let options = ApplyOptions {
                dry_run: args.dry_run,
                auto_confirm: args.yes,
            };
            apply_single(&applier, &namespace, &desired, &options).await
        }
        selector => {
            let options = BatchOptions {
                dry_run: args.dry_run,
                auto_confirm: args.yes,
                continue_past_conflicts: args.continue_on_conflicts,
                ..BatchOptions::default()
            };
            apply_batch(&applier, &selector, &desired, &options).await
        }
    }
}

/// Applier whose per-call deadline follows the client's request timeout
fn schema_applier<'a>(store: &'a TurbopufferStore, cache: &ClientCache) -> SchemaApplier<'a> {
    SchemaApplier::new(store).with_call_timeout(cache.config().timeout)
}

/// One line per desired attribute, sorted by name
fn diff_lines(diff: &SchemaDiff) -> Vec<String> {
    diff.entries()
        .into_iter()
        .map(|entry| match entry {
            DiffEntry::Unchanged { name, display } => {
                style(format!("  {name}: {display}")).dim().to_string()
            }
            DiffEntry::Addition { name, display } => {
                style(format!("+ {name}: {display}  (new)")).green().to_string()
            }
            DiffEntry::Conflict {
                name,
                current,
                desired,
            } => style(format!(
                "! {name}: {current} -> {desired}  (type change not allowed)"
            ))
            .red()
            .to_string(),
        })
        .collect()
}

async fn apply_single(
    applier: &SchemaApplier<'_>,
    namespace: &str,
    desired: &Schema,
    options: &ApplyOptions,
) -> Result<ExitCode> {
    let progress = spinner(format!("Fetching current schema for {namespace}..."));
    let plan = applier.plan(namespace, desired).await;
    progress.finish_and_clear();

    println!(
        "\n{}\n",
        style(format!("Schema changes for namespace: {namespace}")).bold()
    );
    let lines = diff_lines(&plan.diff);
    if lines.is_empty() {
        println!("{}", style("No schema attributes").dim());
    }
    for line in lines {
        println!("{line}");
    }
    println!();

    let outcome = applier.commit(&plan, desired, options, &TerminalConfirm).await;
    match &outcome {
        ApplyOutcome::Blocked => {
            error_line("Cannot apply schema with type conflicts.");
            hint_line("Changing an existing attribute's type is not allowed.");
        }
        ApplyOutcome::NoChanges => println!(
            "{}",
            style("Schema is already up to date, no changes needed.").green()
        ),
        ApplyOutcome::DryRun => println!("{}", style("Dry run mode - no changes applied").yellow()),
        ApplyOutcome::Aborted => println!("{}", style("Aborted").yellow()),
        ApplyOutcome::Applied => println!(
            "{}",
            style(format!("✓ Successfully applied schema to {namespace}")).green()
        ),
        ApplyOutcome::Failed(message) => error_line(format!("Error applying schema: {message}")),
    }
    Ok(exit_code(outcome.exit_code()))
}

fn changes_cell(result: &BatchApplyResult) -> String {
    if result.conflicts > 0 {
        return format!(
            "+{} attributes {}",
            result.additions,
            style(format!("({} conflict(s))", result.conflicts)).red()
        );
    }
    if result.has_planning_error() {
        return style("N/A").dim().to_string();
    }
    match result.additions {
        0 => style("no changes").dim().to_string(),
        n => format!("+{n} attribute(s)"),
    }
}

fn status_cell(status: &TargetStatus) -> String {
    match status {
        TargetStatus::Blocked => style("blocked").red().to_string(),
        TargetStatus::Skipped => style("skipped").yellow().to_string(),
        TargetStatus::Error(message) => style(format!("error: {message}")).red().to_string(),
        TargetStatus::UpToDate => style("up-to-date").green().to_string(),
        TargetStatus::WouldSkip => style("would skip").dim().to_string(),
        TargetStatus::WouldApply => style("would apply").yellow().to_string(),
        TargetStatus::Applied => style("applied").green().to_string(),
        TargetStatus::Failed(message) if message.is_empty() => style("failed").red().to_string(),
        TargetStatus::Failed(message) => style(format!("failed: {message}")).red().to_string(),
    }
}

fn summary_table(plan: &BatchPlan, phase: SummaryPhase) -> Table {
    let mut table = Table::new(["Namespace", "Changes", "Status"]);
    for result in &plan.results {
        table.push_row(vec![
            style(&result.namespace).bold().to_string(),
            changes_cell(result),
            status_cell(&result.status(phase)),
        ]);
    }
    table
}

async fn apply_batch(
    applier: &SchemaApplier<'_>,
    selector: &TargetSelector,
    desired: &Schema,
    options: &BatchOptions,
) -> Result<ExitCode> {
    let progress = spinner("Listing namespaces...");
    let listed = resolve_targets(applier.store(), selector, applier.call_timeout()).await;
    progress.finish_and_clear();
    let targets = listed?;

    let prefix = match selector {
        TargetSelector::Prefix(prefix) => Some(prefix.as_str()),
        _ => None,
    };
    if targets.is_empty() {
        let message = match prefix {
            Some(prefix) => format!("No namespaces found matching prefix: {prefix}"),
            None => "No namespaces found".to_string(),
        };
        println!("{}", style(message).yellow());
        return Ok(ExitCode::SUCCESS);
    }
    let found = match prefix {
        Some(prefix) => format!(
            "Found {} namespace(s) matching prefix '{prefix}'",
            targets.len()
        ),
        None => format!("Found {} namespace(s)", targets.len()),
    };
    println!("\n{}", style(found).bold());

    let progress = spinner(format!("Analyzing schema for {} namespace(s)...", targets.len()));
    let mut plan = applier
        .plan_batch(&targets, desired, options.concurrency)
        .await;
    progress.finish_and_clear();

    println!(
        "\n{}\n",
        style(format!("Schema changes for {} namespace(s):", targets.len())).bold()
    );
    print!("{}", summary_table(&plan, SummaryPhase::Preview).render());
    println!();
    if let Some(warning) = conflict_skip_warning(&plan, options) {
        println!("{}\n", style(warning).yellow());
    }

    let outcome = applier
        .commit_batch(&mut plan, desired, options, &TerminalConfirm)
        .await;
    match outcome {
        BatchOutcome::Blocked => {
            error_line("Some namespaces have type conflicts.");
            hint_line("Changing an existing attribute's type is not allowed.");
            hint_line("Fix conflicts before applying schema changes, or pass --continue-on-conflicts.");
        }
        BatchOutcome::NoChanges if plan.planning_errors() > 0 => println!(
            "{}",
            style(format!(
                "No changes needed for the {} namespace(s) that could be analyzed.",
                plan.results.len() - plan.planning_errors()
            ))
            .yellow()
        ),
        BatchOutcome::NoChanges => println!(
            "{}",
            style("All namespaces are already up to date, no changes needed.").green()
        ),
        BatchOutcome::DryRun => println!("{}", style("Dry run mode - no changes applied").yellow()),
        BatchOutcome::NothingToWrite => println!("{}", style(nothing_to_write(&plan)).yellow()),
        BatchOutcome::Aborted => println!("{}", style("Aborted").yellow()),
        BatchOutcome::Committed { applied, failed } => {
            println!("\n{}\n", style("Results:").bold());
            print!("{}", summary_table(&plan, SummaryPhase::Final).render());
            if failed == 0 {
                println!(
                    "\n{}",
                    style(format!("✓ Successfully applied schema to {applied} namespace(s)")).green()
                );
            } else {
                println!(
                    "\n{}",
                    style(format!(
                        "Applied schema to {applied} namespace(s), {failed} failed"
                    ))
                    .yellow()
                );
            }
        }
    }

    let errors = plan.planning_errors();
    if errors > 0 && outcome != BatchOutcome::Blocked {
        hint_line(format!(
            "{errors} namespace(s) could not be analyzed and were left unchanged"
        ));
    }
    let report = BatchReport { plan, outcome };
    Ok(exit_code(report.exit_code()))
}

fn conflict_skip_warning(plan: &BatchPlan, options: &BatchOptions) -> Option<String> {
    (options.continue_past_conflicts && plan.has_conflicts()).then(|| {
        format!(
            "Skipping {} namespace(s) with type conflicts (--continue-on-conflicts)",
            plan.conflicted()
        )
    })
}

fn nothing_to_write(plan: &BatchPlan) -> String {
    match plan.conflicted() {
        0 => "No namespaces need updates.".to_string(),
        conflicted => format!(
            "No namespaces need updates: the only changes were type conflicts \
             in {conflicted} skipped namespace(s)."
        ),
    }
}

fn copy_preview(plan: &CopyPlan) -> Vec<String> {
    let mut lines = vec![
        format!("Copying schema from: {}", style(&plan.source).bold()),
        format!("Creating namespace:  {}", style(&plan.target).bold()),
        String::new(),
        style("Schema:").bold().to_string(),
    ];
    let mut attributes: Vec<_> = plan.schema.iter().collect();
    attributes.sort_by(|a, b| a.0.cmp(b.0));
    if attributes.is_empty() {
        lines.push(style("  (no schema attributes)").dim().to_string());
    }
    for (name, ty) in attributes {
        lines.push(format!("  {name}: {}", ty.display_form()));
    }
    lines.push(String::new());
    lines.push(
        style("Note: A placeholder row will be created to initialize the namespace.")
            .dim()
            .to_string(),
    );
    lines
}

async fn copy(args: CopyArgs) -> Result<ExitCode> {
    let cache = client_cache()?;
    let store = TurbopufferStore::new(cache.client(args.region.as_deref())?);
    let applier = schema_applier(&store, &cache);

    let progress = spinner(format!("Reading schema from {}...", args.namespace));
    let planned = applier.plan_copy(&args.namespace, &args.target).await;
    progress.finish_and_clear();
    let plan = match planned {
        Ok(plan) => plan,
        Err(refusal) => {
            error_line(refusal);
            return Ok(ExitCode::FAILURE);
        }
    };

    println!();
    for line in copy_preview(&plan) {
        println!("{line}");
    }
    println!();

    let outcome = applier.commit_copy(&plan, args.yes, &TerminalConfirm).await;
    match &outcome {
        CopyOutcome::Aborted => println!("{}", style("Aborted").yellow()),
        CopyOutcome::Copied => println!(
            "{}",
            style(format!(
                "✓ Successfully created namespace '{}' with schema from '{}'",
                plan.target, plan.source
            ))
            .green()
        ),
        CopyOutcome::Failed(message) => error_line(format!("Error creating namespace: {message}")),
    }
    Ok(exit_code(outcome.exit_code()))
}
