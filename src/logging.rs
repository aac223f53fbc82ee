//! Tracing setup for the binary.
//!
//! The dashboard owns the terminal, so it logs to a daily file under the data
//! directory. One-shot commands log to stderr.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FILTER_ENV: &str = "VITRINE_LOG";
const DEFAULT_FILTER: &str = "vitrine=info";

fn filter() -> EnvFilter {
  EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir().ok_or_else(|| eyre!("Could not determine data directory"))?;
  Ok(data_dir.join("vitrine").join("logs"))
}

/// Log to `<data_dir>/vitrine/logs/vitrine.log.<date>`. Keep the guard alive
/// until exit so buffered lines are flushed.
pub fn init_file() -> Result<WorkerGuard> {
  let dir = log_dir()?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "vitrine.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter())
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

pub fn init_stderr() -> Result<()> {
  tracing_subscriber::registry()
    .with(filter())
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))
}
