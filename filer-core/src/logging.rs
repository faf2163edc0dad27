//! src/logging.rs
//! ============================================================================
//! # Logging: JSON-lines tracing backend for the `filer` binary
//!
//! The library only emits `tracing` events. Every record carries a `marker`
//! field (`DIR_SCAN`, `DIR_DIFF`, `VIEW_EVENT`, `CACHE_OPERATION`,
//! `REGISTRY`) so a log file can be grepped by event class. The binary
//! installs a subscriber through [`LoggerBuilder`] and keeps the returned
//! [`WorkerGuard`] alive until exit so buffered lines get flushed.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use compact_str::{CompactString, ToCompactString};
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, fmt::time::ChronoUtc, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{FilerError, FilerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub log_file_prefix: CompactString,
    pub log_level: CompactString,
    pub max_log_files: usize,
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: CompactString::const_new("filer"),
            log_level: CompactString::const_new("info"),
            max_log_files: 10,
            rotation: LogRotation::Daily,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<LoggingError> for FilerError {
    fn from(err: LoggingError) -> Self {
        Self::Logging(err.to_compact_string())
    }
}

// Logger builder
pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the global subscriber. Fails if one is already installed.
    pub async fn build(self) -> FilerResult<WorkerGuard> {
        validate_config(&self.config)?;
        setup_log_directory(&self.config.log_dir).await?;

        let rotation = match self.config.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Daily => Rotation::DAILY,
        };

        let file_appender = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(self.config.log_file_prefix.as_str())
            .filename_suffix("jsonl")
            .max_log_files(self.config.max_log_files)
            .build(&self.config.log_dir)
            .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(non_blocking)
            .with_filter(make_filter(&self.config.log_level)?);

        tracing_subscriber::registry()
            .with(json_layer)
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)?;

        Ok(guard)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn make_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    let directive = Directive::from_str(level)
        .map_err(|e| LoggingError::ConfigError(format!("Invalid log level {level:?}: {e}")))?;

    Ok(EnvFilter::from_default_env().add_directive(directive))
}

fn validate_config(config: &LoggerConfig) -> Result<(), LoggingError> {
    if config.log_file_prefix.is_empty() {
        return Err(LoggingError::ConfigError(
            "Log file prefix must not be empty".to_string(),
        ));
    }

    if config.max_log_files == 0 {
        return Err(LoggingError::ConfigError(
            "Max log files must be greater than 0".to_string(),
        ));
    }

    validate_log_directory(&config.log_dir)
}

fn validate_log_directory(path: &Path) -> Result<(), LoggingError> {
    if path.components().count() == 0 {
        return Err(LoggingError::InvalidLogDirectory("Empty path".to_string()));
    }

    for component in path.components() {
        if component == std::path::Component::ParentDir {
            return Err(LoggingError::InvalidLogDirectory(
                "Path contains parent directory references".to_string(),
            ));
        }
    }

    Ok(())
}

async fn setup_log_directory(log_dir: &Path) -> Result<(), LoggingError> {
    if !TokioFs::try_exists(log_dir).await.unwrap_or(false) {
        TokioFs::create_dir_all(log_dir).await?;
    }
    Ok(())
}
