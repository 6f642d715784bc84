use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Stdout-only logging for the short commands.
pub fn init_stdout() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Logs to stdout and to `<log_dir>/<YYYYmmddHHMMSS>.log`. Returns the file path.
pub fn init_with_file(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Unable to create log directory {}", log_dir.display()))?;
    let path = log_file_path(log_dir, Local::now());
    let file = File::create(&path)
        .with_context(|| format!("Unable to create log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("Unable to install tracing subscriber")?;

    Ok(path)
}

pub fn log_file_path(log_dir: &Path, now: DateTime<Local>) -> PathBuf {
    log_dir.join(format!("{}.log", now.format("%Y%m%d%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 22, 10).unwrap();
        assert_eq!(
            log_file_path(Path::new("logs"), now),
            PathBuf::from("logs/20240305142210.log")
        );
    }
}
