use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("Unit {index} ({role}) failed: {message}")]
    UnitFailed {
        index: usize,
        role: String,
        message: String,
    },

    #[error("Batch cancelled")]
    Cancelled,

    #[error("{stage} stage failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] thesis_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
