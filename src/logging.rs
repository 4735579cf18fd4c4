use crate::error::{DoctorError, ErrorSeverity};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable console logging (stderr, so stdout stays the report)
    pub console_enabled: bool,
    /// Enable file logging
    pub file_enabled: bool,
    /// Log file directory
    pub log_dir: PathBuf,
    /// Log file name prefix
    pub file_prefix: String,
    /// Log rotation (daily, hourly, never)
    pub rotation: String,
    /// Enable structured JSON logging for the file layer
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_enabled: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_prefix: "redshift-kb-doctor".to_string(),
            rotation: "daily".to_string(),
            json_format: false,
        }
    }
}

/// Initialize logging system.
///
/// The returned guard flushes the file writer on drop and must be held until
/// the process exits.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let mut layers = Vec::new();
    let mut guard = None;

    if config.console_enabled {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        layers.push(console_layer.boxed());
    }

    if config.file_enabled {
        std::fs::create_dir_all(&config.log_dir)?;

        let file_appender = match config.rotation.as_str() {
            "daily" => rolling::daily(&config.log_dir, &config.file_prefix),
            "hourly" => rolling::hourly(&config.log_dir, &config.file_prefix),
            _ => rolling::never(&config.log_dir, format!("{}.log", config.file_prefix)),
        };

        let (writer, file_guard) = non_blocking(file_appender);
        guard = Some(file_guard);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed()
        };

        layers.push(file_layer);
    }

    tracing_subscriber::registry().with(layers).with(env_filter).try_init()?;

    Ok(guard)
}

/// Log a fatal error at a level matching its severity
pub fn log_error(error: &DoctorError) {
    let severity = error.severity();

    match severity {
        ErrorSeverity::Low => {
            tracing::warn!(severity = %severity.as_str(), "{}", error);
        }
        ErrorSeverity::Medium => {
            tracing::error!(severity = %severity.as_str(), "{}", error);
        }
        ErrorSeverity::High => {
            tracing::error!(
                severity = %severity.as_str(),
                user_message = %error.user_message(),
                "FATAL: {}",
                error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
    }

    #[test]
    fn test_partial_logging_section_keeps_defaults() {
        let config: Config = toml::from_str("[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.rotation, "daily");
        assert_eq!(config.logging.file_prefix, "redshift-kb-doctor");
    }
}
