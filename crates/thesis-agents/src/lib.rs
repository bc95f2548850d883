pub mod batch;
pub mod classify;
pub mod claude_cli;
pub mod error;
pub mod executor;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod schemas;

pub mod test_support;

pub use batch::BatchRunner;
pub use classify::{classify, BucketEntry, Buckets};
pub use error::AgentError;
pub use executor::{ClaudeExecutor, UnitExecutor};
pub use pipeline::{Pipeline, PipelineReport, Stage, StageReport};
pub use schemas::Schemas;
