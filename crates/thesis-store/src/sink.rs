use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Something to persist: agent text that may or may not be JSON, or an
/// already-structured value.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Text(&'a str),
    Json(&'a Value),
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Payload::Text(text)
    }
}

impl<'a> From<&'a String> for Payload<'a> {
    fn from(text: &'a String) -> Self {
        Payload::Text(text)
    }
}

impl<'a> From<&'a Value> for Payload<'a> {
    fn from(value: &'a Value) -> Self {
        Payload::Json(value)
    }
}

/// Write a payload to `path`, overwriting any existing file.
///
/// Text that parses as JSON is re-emitted pretty-printed; anything else is
/// written verbatim. The parent directory must already exist. The write is
/// not atomic, so a crash mid-write can leave a truncated file.
pub fn persist<'a>(path: &Path, payload: impl Into<Payload<'a>>) -> Result<(), StoreError> {
    let contents = match payload.into() {
        Payload::Json(value) => serde_json::to_string_pretty(value)?,
        Payload::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => serde_json::to_string_pretty(&value)?,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Payload is not JSON, writing raw text");
                text.to_string()
            }
        },
    };

    std::fs::write(path, contents).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), "Artifact written");
    Ok(())
}

/// Persists named artifacts under a fixed root directory.
#[derive(Debug, Clone)]
pub struct JsonSink {
    root: PathBuf,
}

impl JsonSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Persist `payload` as `name` and return the written path.
    pub fn write<'a>(
        &self,
        name: &str,
        payload: impl Into<Payload<'a>>,
    ) -> Result<PathBuf, StoreError> {
        let path = self.path_for(name);
        persist(&path, payload)?;
        Ok(path)
    }
}
