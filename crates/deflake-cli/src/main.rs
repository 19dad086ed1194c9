//! DeFlake CLI - triage failing browser tests
//!
//! Usage:
//!   deflake -- npx playwright test      Run tests, triage on failure
//!   deflake --log run.log --html p.html Triage an existing failure
//!   deflake --mock -- npm test          Same, without calling the API

use anyhow::{Context, Result};
use clap::Parser;
use deflake_client::{resolve_settings, HttpReportClient, MockReportClient, ReportClient};
use deflake_core::{DeflakeConfig, DeflakeError};
use deflake_runner::{
    render_text, run_wrapped, standalone_input, ProcessSupervisor, TriageFlow, TriageOutcome,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit code when the wrapped command cannot be started
const EXIT_SPAWN_FAILED: i32 = 127;

#[derive(Parser)]
#[command(name = "deflake")]
#[command(author, version, about = "Find and fix the cause of failing browser tests")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Error log of a failed run (standalone mode)
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// HTML snapshot or report to send instead of the discovered one
    #[arg(long, value_name = "PATH")]
    html: Option<PathBuf>,

    /// Fix-suggestion endpoint (overrides DEFLAKE_API_URL and config)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Answer locally with a canned fix; no API key or network needed
    #[arg(long)]
    mock: bool,

    /// Write a structured fix into the source file
    #[arg(long)]
    apply: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Test command to wrap
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the child's output and the report
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.downcast_ref::<DeflakeError>().is_some_and(DeflakeError::is_usage) {
                eprintln!("Run `deflake --help` for usage.");
            }
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

/// Exit code for an error that ended the run before a child exit code was known
fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<DeflakeError>() {
        Some(DeflakeError::Spawn { .. }) => EXIT_SPAWN_FAILED,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let working_dir = std::env::current_dir().context("Failed to determine the working directory")?;
    let config = DeflakeConfig::load_or_default(&working_dir)?;

    match cli.command.split_first() {
        Some((program, args)) => cmd_wrap(&cli, program, args, &working_dir, &config).await,
        None => cmd_standalone(&cli, &working_dir, &config).await,
    }
}

async fn cmd_wrap(
    cli: &Cli,
    program: &str,
    args: &[String],
    working_dir: &Path,
    config: &DeflakeConfig,
) -> Result<i32> {
    info!("Running: {} {}", program, args.join(" "));

    let supervisor = ProcessSupervisor::new();
    let outcome = run_wrapped(&supervisor, program, args, || {
        make_flow(cli, working_dir, config)
    })
    .await?;

    // From here on the child's exit code is final; output problems are only logged
    let shown = match outcome.triage {
        None => writeln!(std::io::stdout(), "\nTests passed. Nothing to heal.")
            .map_err(anyhow::Error::from),
        Some(Ok(triage)) => present(&triage, cli.json),
        Some(Err(e)) => {
            error!("Triage failed: {}", e);
            eprintln!("Error: {}", e);
            Ok(())
        }
    };
    if let Err(e) = shown {
        warn!("Could not write the report: {}", e);
    }

    Ok(outcome.exit_code)
}

async fn cmd_standalone(cli: &Cli, working_dir: &Path, config: &DeflakeConfig) -> Result<i32> {
    let input = standalone_input(working_dir, config, cli.log.as_deref(), cli.html.as_deref())?;
    let flow = make_flow(cli, working_dir, config)?;
    let outcome = flow.run(input).await?;

    present(&outcome, cli.json)?;
    Ok(if outcome.report.success { 0 } else { 1 })
}

fn make_flow(cli: &Cli, working_dir: &Path, config: &DeflakeConfig) -> deflake_core::Result<TriageFlow> {
    let client: Arc<dyn ReportClient> = if cli.mock {
        info!("Mock mode: no API call will be made");
        Arc::new(MockReportClient::new())
    } else {
        let settings = resolve_settings(config, cli.api_url.as_deref());
        Arc::new(HttpReportClient::new(settings)?)
    };

    Ok(TriageFlow::new(client, working_dir, config, dirs::home_dir()).with_apply(cli.apply))
}

fn present(outcome: &TriageOutcome, json: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&outcome.report)?)?;
    } else {
        write!(out, "{}", render_text(&outcome.report))?;
    }

    if let Some(patch) = &outcome.applied {
        if json {
            info!("Applied fix to {}:{}", patch.path.display(), patch.line);
        } else {
            writeln!(out, "Applied fix to {}:{}", patch.path.display(), patch.line)?;
            writeln!(out, "  - {}", patch.original.trim())?;
            writeln!(out, "  + {}", patch.replacement.trim())?;
        }
    }
    out.flush()?;

    if let Some(reason) = &outcome.patch_error {
        eprintln!("Fix not applied: {}", reason);
    }

    Ok(())
}
