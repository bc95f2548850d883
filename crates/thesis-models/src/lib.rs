pub mod config;
pub mod hypothesis;
pub mod portfolio;
pub mod work;

pub use config::{
    ClassificationRule, FailurePolicy, OutputConfig, PipelineConfig, RefineConfig,
    RefineGranularity, ResearchConfig, ResearchTopic, RoleTemplate, RuntimeConfig, SchemaPaths,
};
pub use hypothesis::{hypothesis_subject, normalize_hypotheses};
pub use portfolio::{PortfolioSummary, Position};
pub use work::{AgentProfile, TaskSpec, UnitOutcome, WorkResult, WorkUnit};
