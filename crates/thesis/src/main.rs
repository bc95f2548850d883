use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use thesis_agents::claude_cli::check_cli_available;
use thesis_models::config::{FailurePolicy, RefineGranularity};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "thesis",
    about = "Macro research to trade hypothesis pipeline - researches, hypothesizes, critiques, refines and allocates"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/thesis.toml")]
    config: PathBuf,

    /// Override the artifact output directory
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Refinement granularity: per-hypothesis or per-batch
    #[arg(long)]
    granularity: Option<RefineGranularity>,

    /// Unit failure policy: capture or fail-fast
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    /// Also write JSON-formatted logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Skip checking that the agent CLI is installed
    #[arg(long)]
    skip_cli_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    thesis::telemetry::init(cli.log_file.as_deref())?;

    let mut config = thesis::load_config(&cli.config)?;
    if let Some(dir) = cli.output_dir {
        config.output.dir = dir;
    }
    if let Some(granularity) = cli.granularity {
        config.refine.granularity = granularity;
    }
    if let Some(policy) = cli.failure_policy {
        config.runtime.failure_policy = policy;
    }

    if !cli.skip_cli_check && !check_cli_available(&config.runtime.cli_binary).await {
        bail!(
            "Agent CLI '{}' not found or not runnable",
            config.runtime.cli_binary
        );
    }

    let cancel = CancellationToken::new();
    let pipeline =
        thesis::build_pipeline(&config, cancel.clone()).context("Failed to set up pipeline")?;

    // Handle shutdown signals
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    let report = thesis::run(&pipeline)
        .await
        .map_err(|e| anyhow::anyhow!("Pipeline failed: {e}"))?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
