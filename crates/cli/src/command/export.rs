use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::style;
use tpuff_client::{ClientCache, ClientConfig, RegionScope};

use crate::exporter::{self, BindError, Exporter, ExporterConfig};
use crate::render::{error_line, hint_line};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// HTTP server port
    #[arg(short, long, default_value_t = 9876, allow_negative_numbers = true)]
    pub port: i64,

    /// Query a specific region (default: TURBOPUFFER_REGION)
    #[arg(short, long)]
    pub region: Option<String>,

    /// Query all turbopuffer regions
    #[arg(short = 'A', long)]
    pub all_regions: bool,

    /// Metric refresh interval in seconds
    #[arg(short, long, default_value_t = 60, allow_negative_numbers = true)]
    pub interval: i64,

    /// API request timeout per region in seconds
    #[arg(short, long, default_value_t = 30, allow_negative_numbers = true)]
    pub timeout: i64,

    /// Include recall estimation metrics (runs queries, incurs costs)
    #[arg(long)]
    pub include_recall: bool,

    /// Recall estimation refresh interval in seconds
    #[arg(long, default_value_t = 3600, allow_negative_numbers = true)]
    pub recall_interval: i64,
}

/// Checked settings: exporter config plus the per-request timeout
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    exporter: ExporterConfig,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invalid {
    Port,
    Interval,
    Timeout,
    RecallInterval,
    RegionConflict,
}

impl Invalid {
    fn message(self) -> &'static str {
        match self {
            Self::Port => "Port must be a number between 1 and 65535",
            Self::Interval => "Interval must be a positive number",
            Self::Timeout => "Timeout must be a positive number",
            Self::RecallInterval => "Recall interval must be a positive number",
            Self::RegionConflict => "Cannot use both --all-regions and --region flags together",
        }
    }
}

fn positive_secs(value: i64, invalid: Invalid) -> Result<Duration, Invalid> {
    u64::try_from(value)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or(invalid)
}

fn settings(args: &ExportArgs) -> Result<Settings, Invalid> {
    let port = u16::try_from(args.port)
        .ok()
        .filter(|port| *port > 0)
        .ok_or(Invalid::Port)?;
    let interval = positive_secs(args.interval, Invalid::Interval)?;
    let timeout = positive_secs(args.timeout, Invalid::Timeout)?;
    let recall_interval = positive_secs(args.recall_interval, Invalid::RecallInterval)?;
    if args.all_regions && args.region.is_some() {
        return Err(Invalid::RegionConflict);
    }

    let scope = if args.all_regions {
        RegionScope::All
    } else {
        RegionScope::Single(args.region.clone())
    };
    Ok(Settings {
        exporter: ExporterConfig {
            port,
            scope,
            interval,
            include_recall: args.include_recall,
            recall_interval,
        },
        timeout,
    })
}

fn print_banner(config: &ExporterConfig) {
    let port = config.port;
    println!("{}", style("✓ Turbopuffer Prometheus exporter running").green());
    println!("{}", style(format!("  Port:           {port}")).dim());
    println!(
        "{}",
        style(format!("  Refresh:        {}s", config.interval.as_secs())).dim()
    );
    println!(
        "{}",
        style(format!("  Region mode:    {}", config.region_mode())).dim()
    );
    if config.include_recall {
        println!(
            "{}",
            style(format!(
                "  Recall:         enabled (refresh: {}s)",
                config.recall_interval.as_secs()
            ))
            .yellow()
        );
        println!(
            "{}",
            style("                  Note: Recall estimation runs queries and incurs costs").dim()
        );
    } else {
        println!(
            "{}",
            style("  Recall:         disabled (use --include-recall to enable)").dim()
        );
    }
    println!("\n{}", style("  Endpoints:").dim());
    for path in ["metrics", "health", ""] {
        println!("{}", style(format!("    http://localhost:{port}/{path}")).dim());
    }
    println!("\n{}\n", style("  Press Ctrl+C to stop").dim());
}

pub async fn run(args: ExportArgs) -> Result<ExitCode> {
    let settings = match settings(&args) {
        Ok(settings) => settings,
        Err(invalid) => {
            error_line(invalid.message());
            if invalid == Invalid::RegionConflict {
                hint_line(
                    "Please use either --all-regions to query all regions, \
                     or --region to specify a single region",
                );
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut client_config = ClientConfig::from_env()?;
    client_config.timeout = settings.timeout;
    let config = settings.exporter;

    let listener = match exporter::bind(config.port) {
        Ok(listener) => listener,
        Err(err @ BindError::InUse(_)) => {
            error_line(err);
            hint_line("Please choose a different port with --port <number>");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => {
            error_line(format!("Error starting exporter: {err}"));
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut exporter = Exporter::new(ClientCache::new(client_config), config.clone())?;
    println!("{}", style("Performing initial metrics fetch...").dim());
    exporter.refresh().await;
    print_banner(&config);

    exporter::serve(listener, exporter).await?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ExportArgs,
    }

    fn parse(argv: &[&str]) -> ExportArgs {
        Harness::parse_from(std::iter::once("export").chain(argv.iter().copied())).args
    }

    #[test]
    fn defaults() {
        let settings = settings(&parse(&[])).unwrap();
        assert_eq!(
            settings.exporter,
            ExporterConfig {
                port: 9876,
                scope: RegionScope::Single(None),
                interval: Duration::from_secs(60),
                include_recall: false,
                recall_interval: Duration::from_secs(3600),
            }
        );
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_are_named() {
        let check = |argv: &[&str]| settings(&parse(argv)).unwrap_err();
        assert_eq!(check(&["-p", "0"]), Invalid::Port);
        assert_eq!(check(&["--port", "70000"]), Invalid::Port);
        assert_eq!(check(&["-i", "0"]), Invalid::Interval);
        assert_eq!(check(&["-t", "-5"]), Invalid::Timeout);
        assert_eq!(check(&["--recall-interval", "0"]), Invalid::RecallInterval);
        assert_eq!(check(&["-A", "-r", "aws-us-east-1"]), Invalid::RegionConflict);
    }

    #[test]
    fn all_regions_with_recall() {
        let settings = settings(&parse(&["-A", "--include-recall", "--recall-interval", "600"]))
            .unwrap();
        assert_eq!(settings.exporter.scope, RegionScope::All);
        assert!(settings.exporter.include_recall);
        assert_eq!(settings.exporter.recall_interval, Duration::from_secs(600));
    }
}
