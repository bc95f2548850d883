use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::work::AgentProfile;

pub const BUCKET_REFINED: &str = "refined";
pub const BUCKET_CRITIQUE: &str = "critique";
pub const BUCKET_PORTFOLIO: &str = "portfolio";

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub runtime: RuntimeConfig,
    pub output: OutputConfig,
    /// Schema name -> path of a JSON Schema document embedded into prompts.
    pub schemas: SchemaPaths,
    pub research: ResearchConfig,
    /// Trader template. Falls back to the built-in trader prompt.
    pub trader: Option<RoleTemplate>,
    pub refine: RefineConfig,
}

/// Agent runtime and batch execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Executable used to run agents.
    pub cli_binary: String,
    /// Default model for every agent without its own override.
    pub model: String,
    /// Per-unit timeout in seconds. A unit exceeding it counts as failed.
    pub unit_timeout_seconds: u64,
    /// Maximum units in flight per batch. 0 means unbounded.
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Environment variables that must be set before any batch is dispatched.
    pub required_env: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cli_binary: "claude".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            unit_timeout_seconds: 300,
            max_concurrency: 8,
            failure_policy: FailurePolicy::default(),
            required_env: vec![],
        }
    }
}

/// What the batch runner does when a single unit fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record the failure in the unit's result slot; siblings are unaffected.
    #[default]
    Capture,
    /// Abort the whole batch on the first failure.
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capture" => Ok(Self::Capture),
            "fail-fast" => Ok(Self::FailFast),
            other => Err(format!(
                "unknown failure policy '{other}' (expected capture or fail-fast)"
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::FailFast => f.write_str("fail-fast"),
        }
    }
}

/// Artifact locations. File names are relative to `dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    pub research: String,
    pub raw_hypothesis: String,
    pub hypotheses: String,
    pub refined: String,
    pub critique: String,
    pub portfolio: String,
    pub portfolio_summary: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "results".to_string(),
            research: "research_summary.json".to_string(),
            raw_hypothesis: "trader_hypothesis.json".to_string(),
            hypotheses: "hypotheses.json".to_string(),
            refined: "refined_hypotheses.json".to_string(),
            critique: "critic_feedback.json".to_string(),
            portfolio: "portfolio.json".to_string(),
            portfolio_summary: "portfolio_summary.json".to_string(),
        }
    }
}

impl OutputConfig {
    /// File name for a classifier bucket. Buckets added through extra rules
    /// land in `<bucket>.json`.
    pub fn bucket_file(&self, bucket: &str) -> String {
        match bucket {
            BUCKET_REFINED => self.refined.clone(),
            BUCKET_CRITIQUE => self.critique.clone(),
            BUCKET_PORTFOLIO => self.portfolio.clone(),
            other => format!("{other}.json"),
        }
    }
}

/// Named schema documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SchemaPaths(pub BTreeMap<String, String>);

impl Default for SchemaPaths {
    fn default() -> Self {
        Self(
            [
                ("raw_trade_thesis", "schemas/raw_trade_thesis.json"),
                ("trade_thesis", "schemas/trade_thesis.json"),
                ("portfolio", "schemas/portfolio.json"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        )
    }
}

/// A prompt template bound to an agent persona.
///
/// `description` may contain `{research}`, `{hypothesis}`, `{schema}` and
/// `{date}` placeholders; `expected_output` may contain `{schema}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleTemplate {
    #[serde(flatten)]
    pub agent: AgentProfile,
    pub description: String,
    #[serde(default)]
    pub expected_output: String,
    /// Name of the entry in `[schemas]` substituted for `{schema}`.
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchTopic {
    pub name: String,
    #[serde(flatten)]
    pub template: RoleTemplate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResearchConfig {
    /// Research topics. Empty means the built-in macro topic set.
    pub topics: Vec<ResearchTopic>,
}

/// Whether refinement fans out per hypothesis or runs once over the list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RefineGranularity {
    #[default]
    PerHypothesis,
    PerBatch,
}

impl FromStr for RefineGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-hypothesis" => Ok(Self::PerHypothesis),
            "per-batch" => Ok(Self::PerBatch),
            other => Err(format!(
                "unknown refine granularity '{other}' (expected per-hypothesis or per-batch)"
            )),
        }
    }
}

impl fmt::Display for RefineGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerHypothesis => f.write_str("per-hypothesis"),
            Self::PerBatch => f.write_str("per-batch"),
        }
    }
}

/// Routes results whose agent role contains `matcher` into `bucket`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationRule {
    pub bucket: String,
    pub matcher: String,
}

impl ClassificationRule {
    pub fn new(bucket: impl Into<String>, matcher: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            matcher: matcher.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefineConfig {
    pub granularity: RefineGranularity,
    /// Write a flattened summary of each portfolio payload.
    pub summarize_portfolio: bool,
    pub rules: Vec<ClassificationRule>,
    pub critic: Option<RoleTemplate>,
    pub refiner: Option<RoleTemplate>,
    pub portfolio: Option<RoleTemplate>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            granularity: RefineGranularity::default(),
            summarize_portfolio: true,
            rules: default_rules(),
            critic: None,
            refiner: None,
            portfolio: None,
        }
    }
}

/// Role matchers for the three refinement agents.
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(BUCKET_REFINED, "Refiner"),
        ClassificationRule::new(BUCKET_CRITIQUE, "Critic"),
        ClassificationRule::new(BUCKET_PORTFOLIO, "Portfolio Construction"),
    ]
}
