//! lintpatch - guarded AI fixes for linter reports

use anyhow::{Context, Result};
use clap::Parser;
use lintpatch::config::Config;
use lintpatch::fix::{FixOutcome, Fixer, RunSummary};
use lintpatch::llm::{GeminiClient, PatchGenerator};
use lintpatch::report::{self, LinterKind};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "lintpatch",
    about = "Fix lint errors with a text-generation model, guarded by tag and syntax checks",
    version
)]
struct Args {
    /// Path to the linter's JSON report
    #[arg(long)]
    report: PathBuf,

    /// Which linter produced the report
    #[arg(long, value_enum)]
    linter: LinterKind,

    /// Only fix this file (optional)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Directory relative report paths are resolved against (defaults to current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file (defaults to ./lintpatch.toml, then the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Generate and check patches without writing them
    #[arg(long)]
    dry_run: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    let root = args.root.clone().unwrap_or_else(|| PathBuf::from("."));

    let (config, source) = Config::load(args.config.as_deref(), &cwd)?;
    match &source {
        Some(path) => info!(config = %path.display(), "loaded config"),
        None => info!("no config file found, using defaults"),
    }

    let Some(raw) = report::load_report(&args.report)? else {
        info!(report = %args.report.display(), "report is empty or missing, nothing to fix");
        return Ok(());
    };

    let mut tasks = report::normalize(&raw, args.linter, &root);
    if let Some(only) = &args.file {
        tasks = report::retain_file(tasks, &root, only);
    }
    if tasks.is_empty() {
        info!("report has no fixable entries, nothing to fix");
        return Ok(());
    }

    let api_key = config.api_key()?;
    let client = GeminiClient::new(
        api_key,
        config.generation.endpoint.clone(),
        config.generation.max_output_tokens,
    )
    .context("Failed to build HTTP client")?;
    let generator = PatchGenerator::new(client, config.fallback_chain());
    info!(models = ?generator.chain().models, files = tasks.len(), "starting run");

    let fixer = Fixer::new(generator, config.safety_gate()?).dry_run(args.dry_run);
    let summary = fixer.run(tasks).await;

    print_summary(&summary);
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "lintpatch=debug" } else { "lintpatch=info" };
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(default_level),
    };

    // Logs go to stderr; the summary on stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn print_summary(summary: &RunSummary) {
    for file in &summary.files {
        let line = match &file.outcome {
            FixOutcome::Fixed { model } => format!("fixed      {} ({})", file.path.display(), model),
            FixOutcome::WouldFix { model } => {
                format!("would fix  {} ({})", file.path.display(), model)
            }
            FixOutcome::Unchanged { .. } => format!("unchanged  {}", file.path.display()),
            FixOutcome::Rejected { reason, .. } => {
                format!("rejected   {} ({})", file.path.display(), reason)
            }
            FixOutcome::GenerationFailed { error } | FixOutcome::IoFailed { error } => {
                format!("failed     {} ({})", file.path.display(), error)
            }
        };
        println!("{}", line);
    }
    println!("{}", summary);
}
