use std::collections::BTreeMap;

use thesis_models::config::SchemaPaths;
use tracing::debug;

use crate::error::AgentError;

/// Schema documents loaded at startup, kept as opaque text for prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schemas(BTreeMap<String, String>);

impl Schemas {
    pub fn new(schemas: BTreeMap<String, String>) -> Self {
        Self(schemas)
    }

    /// Read every configured schema file. A missing file is a configuration error.
    pub fn load(paths: &SchemaPaths) -> Result<Self, AgentError> {
        let mut schemas = BTreeMap::new();
        for (name, path) in &paths.0 {
            let text = std::fs::read_to_string(path).map_err(|e| {
                AgentError::Config(format!("Failed to read schema '{name}' at {path}: {e}"))
            })?;
            debug!(schema = %name, path = %path, bytes = text.len(), "Loaded schema");
            schemas.insert(name.clone(), text);
        }
        Ok(Self(schemas))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}
