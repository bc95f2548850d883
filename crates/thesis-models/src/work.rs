use serde::{Deserialize, Serialize};

/// What an agent is asked to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    pub description: String,
    /// Output contract appended to the prompt (often an embedded JSON schema).
    #[serde(default)]
    pub expected_output: String,
}

/// Who does it. `role` is the label results are classified by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    pub role: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub backstory: String,
    /// Override model for this agent. Falls back to `RuntimeConfig::model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Tool names the runtime may expose to the agent (e.g. "WebSearch").
    #[serde(default)]
    pub tools: Vec<String>,
}

/// One (task, agent) pair submitted to a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkUnit {
    pub task: TaskSpec,
    pub agent: AgentProfile,
    /// Identifier of the record this unit operates on, e.g. `hypothesis-2`.
    /// Carried through to the result so outputs are never paired by position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl WorkUnit {
    pub fn new(task: TaskSpec, agent: AgentProfile) -> Self {
        Self {
            task,
            agent,
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn role(&self) -> &str {
        &self.agent.role
    }
}

/// How a single unit ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Completed { raw: String },
    Failed { error: String },
}

/// Result of executing one `WorkUnit`, in the unit's submission slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkResult {
    /// Task description of the originating unit.
    pub task: String,
    /// Role label of the originating agent.
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub outcome: UnitOutcome,
    pub elapsed_ms: u64,
}

impl WorkResult {
    pub fn completed(unit: &WorkUnit, raw: String, elapsed_ms: u64) -> Self {
        Self::from_unit(unit, UnitOutcome::Completed { raw }, elapsed_ms)
    }

    pub fn failed(unit: &WorkUnit, error: String, elapsed_ms: u64) -> Self {
        Self::from_unit(unit, UnitOutcome::Failed { error }, elapsed_ms)
    }

    fn from_unit(unit: &WorkUnit, outcome: UnitOutcome, elapsed_ms: u64) -> Self {
        Self {
            task: unit.task.description.clone(),
            agent: unit.agent.role.clone(),
            subject: unit.subject.clone(),
            outcome,
            elapsed_ms,
        }
    }

    pub fn raw(&self) -> Option<&str> {
        match &self.outcome {
            UnitOutcome::Completed { raw } => Some(raw),
            UnitOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Failed { .. })
    }
}
