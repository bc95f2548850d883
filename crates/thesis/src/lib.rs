//! THESIS - macro research to trade hypothesis pipeline
//!
//! Runs parallel research agents, turns their findings into trade
//! hypotheses, then critiques, refines and allocates each hypothesis,
//! writing every stage's output to JSON artifacts.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use thesis::agents::{BatchRunner, Pipeline, Schemas};
//! use thesis::models::config::PipelineConfig;
//! use thesis::store::JsonSink;
//! ```

pub use thesis_agents as agents;
pub use thesis_models as models;
pub use thesis_store as store;

pub mod telemetry;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use thesis_agents::{BatchRunner, ClaudeExecutor, Pipeline, PipelineReport, Schemas, UnitExecutor};
use thesis_models::config::PipelineConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Read and parse a TOML configuration file.
pub fn load_config(path: &Path) -> Result<PipelineConfig, anyhow::Error> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Check credentials and load schema documents before anything is dispatched.
pub fn preflight(config: &PipelineConfig) -> Result<Schemas, anyhow::Error> {
    let missing: Vec<&str> = config
        .runtime
        .required_env
        .iter()
        .filter(|name| std::env::var_os(name.as_str()).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        bail!("Missing required environment variables: {}", missing.join(", "));
    }

    Schemas::load(&config.schemas).context("Failed to load schemas")
}

/// Build a pipeline that runs agents through the configured CLI.
pub fn build_pipeline(
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<Pipeline, anyhow::Error> {
    let executor = Arc::new(ClaudeExecutor::new(
        config.runtime.cli_binary.clone(),
        config.runtime.model.clone(),
    ));
    build_pipeline_with(config, executor, cancel)
}

/// Build a pipeline over any executor. Creates the output directory.
pub fn build_pipeline_with(
    config: &PipelineConfig,
    executor: Arc<dyn UnitExecutor>,
    cancel: CancellationToken,
) -> Result<Pipeline, anyhow::Error> {
    let schemas = preflight(config)?;

    std::fs::create_dir_all(&config.output.dir)
        .with_context(|| format!("Failed to create output dir: {}", config.output.dir))?;
    info!(dir = %config.output.dir, "Output directory ready");

    let runner = BatchRunner::from_runtime(executor, &config.runtime, cancel);
    Pipeline::new(runner, config, schemas).context("Failed to build pipeline")
}

/// Run every stage of the given pipeline.
pub async fn run(pipeline: &Pipeline) -> Result<PipelineReport, thesis_agents::AgentError> {
    pipeline.run().await
}
