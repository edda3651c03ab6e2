//! Logging setup.
//!
//! `RUST_LOG` always takes precedence over the configured level.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tsadbench_core::{LoggingConfig, Result};

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Send log events to an append-only file, as text or JSON lines.
///
/// Creates the parent directory if needed. Has no effect if a global
/// subscriber is already installed.
pub fn init_file_logging(config: &LoggingConfig, log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.level))
        .with_ansi(false)
        .with_writer(Mutex::new(file));
    let installed = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("Global subscriber already set; file logging not installed");
    }
    Ok(())
}

/// Send log events to stderr, `warn` and above unless `RUST_LOG` says
/// otherwise.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_file_logging_creates_log_file() {
        let dir = TempDir::new().unwrap();
        let log_file = dir.path().join("nested").join("PCA_pipeline.log");
        init_file_logging(&LoggingConfig::default(), &log_file).unwrap();
        assert!(log_file.exists());
    }
}
