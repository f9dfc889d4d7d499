use directories::ProjectDirs;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::formatter::BracketedFormatter;
use crate::error::{CurationError, Result};

/// How the binary wants logging set up.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Default to `debug` instead of `info` when `RUST_LOG` is unset
    pub verbose: bool,
    /// Write the log file here instead of `./logs`
    pub log_dir: Option<PathBuf>,
}

fn ensure_dir(dir: &Path) -> Option<PathBuf> {
    fs::create_dir_all(dir).ok().map(|_| dir.to_path_buf())
}

/// Pick the directory for log files.
///
/// An explicit directory is used as is. Otherwise `logs/` in the working
/// directory, falling back to the platform data directory when that can't
/// be created.
pub fn resolve_log_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        fs::create_dir_all(dir).map_err(|e| CurationError::io(dir, e))?;
        return Ok(dir.to_path_buf());
    }

    let local = std::env::current_dir()
        .ok()
        .and_then(|cwd| ensure_dir(&cwd.join("logs")));
    if let Some(dir) = local {
        return Ok(dir);
    }

    let fallback = ProjectDirs::from("", "", "dataset-curator")
        .map(|dirs| dirs.data_dir().join("logs"))
        .ok_or_else(|| CurationError::Config("no writable log directory found".to_string()))?;
    fs::create_dir_all(&fallback).map_err(|e| CurationError::io(&fallback, e))?;
    Ok(fallback)
}

/// Install the global subscriber: bracketed output to stdout and to a
/// timestamped file. Returns the log file path.
pub fn setup_logging(options: &LoggingOptions) -> Result<PathBuf> {
    let log_dir = resolve_log_dir(options.log_dir.as_deref())?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("dataset_curator_{}.log", timestamp));

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .map_err(|e| CurationError::io(&log_path, e))?;

    let file_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    let stdout_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(std::io::stdout);

    let default_level = if options.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| CurationError::Config(format!("logging already initialised: {}", e)))?;

    info!("Log file created at: {:?}", log_path);

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_log_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("logs");
        let resolved = resolve_log_dir(Some(&target)).unwrap();
        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }
}
