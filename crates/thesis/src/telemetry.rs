use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber: human-readable logs on stderr,
/// plus JSON lines in `log_file` when given. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init(log_file: Option<&Path>) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = log_file
        .map(|path| {
            open_log_file(path).map(|file| {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
            })
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

fn open_log_file(path: &Path) -> Result<File, anyhow::Error> {
    File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thesis.log");
        std::fs::write(&path, "existing\n").unwrap();

        open_log_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\n");
    }

    #[test]
    fn unwritable_log_path_is_an_error() {
        let err = open_log_file(Path::new("/nonexistent/dir/thesis.log")).unwrap_err();
        assert!(err.to_string().contains("Failed to open log file"));
    }
}
