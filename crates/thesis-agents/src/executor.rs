use async_trait::async_trait;
use thesis_models::work::{AgentProfile, TaskSpec, WorkUnit};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;

/// Executes one work unit and returns the agent's raw output. Mockable for testing.
#[async_trait]
pub trait UnitExecutor: Send + Sync {
    async fn execute(&self, unit: &WorkUnit) -> Result<String, AgentError>;
}

/// Runs each unit as a single-shot Claude CLI call.
pub struct ClaudeExecutor {
    binary: String,
    default_model: String,
}

impl ClaudeExecutor {
    pub fn new(binary: String, default_model: String) -> Self {
        Self {
            binary,
            default_model,
        }
    }

    fn cli_config(&self, agent: &AgentProfile) -> ClaudeCliConfig {
        ClaudeCliConfig {
            binary: self.binary.clone(),
            model: agent
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            allowed_tools: agent.tools.clone(),
        }
    }
}

#[async_trait]
impl UnitExecutor for ClaudeExecutor {
    async fn execute(&self, unit: &WorkUnit) -> Result<String, AgentError> {
        let system_prompt = system_prompt(&unit.agent);
        let user_prompt = user_prompt(&unit.task);
        invoke_claude(&system_prompt, &user_prompt, &self.cli_config(&unit.agent)).await
    }
}

/// Persona prompt built from the agent profile.
pub fn system_prompt(agent: &AgentProfile) -> String {
    let mut prompt = format!("You are a {}.", agent.role);
    if !agent.goal.is_empty() {
        prompt.push_str(&format!("\n\nYour goal: {}", agent.goal));
    }
    if !agent.backstory.is_empty() {
        prompt.push_str(&format!("\n\n{}", agent.backstory));
    }
    prompt
}

/// Task prompt: the description followed by the output contract, if any.
pub fn user_prompt(task: &TaskSpec) -> String {
    if task.expected_output.is_empty() {
        task.description.clone()
    } else {
        format!(
            "{}\n\n## EXPECTED OUTPUT\n\n{}",
            task.description, task.expected_output
        )
    }
}
