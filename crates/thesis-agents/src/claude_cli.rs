use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaudeCliConfig {
    pub binary: String,
    pub model: String,
    /// Tools the agent may call during the run (e.g. `WebSearch`).
    pub allowed_tools: Vec<String>,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            allowed_tools: vec![],
        }
    }
}

impl ClaudeCliConfig {
    fn args<'a>(&'a self, system_prompt: &'a str, user_prompt: &'a str) -> Vec<&'a str> {
        let mut args = vec![
            "-p",
            user_prompt,
            "--system-prompt",
            system_prompt,
            "--model",
            self.model.as_str(),
            "--output-format",
            "text",
        ];
        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools");
            args.extend(self.allowed_tools.iter().map(String::as_str));
        }
        args
    }
}

/// Invoke the CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
///
/// The child is killed if the returned future is dropped, so callers bound
/// the call with `tokio::time::timeout` or task abortion.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, tools = ?config.allowed_tools, "Invoking claude CLI");

    let result = Command::new(&config.binary)
        .args(config.args(system_prompt, user_prompt))
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.binary)))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "{} exited {}: {}",
            config.binary, result.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&result.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli(
            "Claude returned empty response".to_string(),
        ));
    }

    Ok(stdout)
}

/// Check if the CLI binary is available on the system.
pub async fn check_cli_available(binary: &str) -> bool {
    match Command::new(binary).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
