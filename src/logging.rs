use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "aesthetic-scoring";
const MAX_LOG_FILES: usize = 30;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

impl From<&Config> for LogConfig {
    fn from(config: &Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            enable_file_logs: config.enable_file_logs,
            log_dir: config.log_dir.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("failed to create rolling file appender in {dir}: {message}")]
    Appender { dir: String, message: String },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

fn tolerate_existing(result: Result<(), tracing_subscriber::util::TryInitError>) -> Result<(), LogInitError> {
    match result {
        Ok(()) => Ok(()),
        // Tests and embedders may have installed a subscriber already.
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(LogInitError::Subscriber(e.to_string())),
    }
}

/// Install the stdout layer and, when enabled, a daily-rotated JSON file
/// layer. The returned guard flushes the file writer on drop and must be kept
/// alive for the life of the process.
pub fn init_tracing(config: &LogConfig) -> Result<Option<WorkerGuard>, LogInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout_layer = fmt::layer().with_target(true).with_thread_ids(false);

    let registry = Registry::default().with(env_filter).with(stdout_layer);

    if !config.enable_file_logs {
        tolerate_existing(registry.try_init())?;
        return Ok(None);
    }

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(&config.log_dir)
        .map_err(|e| LogInitError::Appender {
            dir: config.log_dir.clone(),
            message: e.to_string(),
        })?;
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false).json();

    tolerate_existing(registry.with(file_layer).try_init())?;
    Ok(Some(guard))
}
