//! CLI configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Which recording to replay.
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Session behaviour.
    #[serde(default)]
    pub session: SessionSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data file replay settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayConfig {
    /// Path to the data file to replay.
    #[serde(default)]
    pub path: Option<String>,
}

/// Session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Start with sequenced records held back.
    #[serde(default)]
    pub start_paused: bool,

    /// Largest record body accepted from a data file, in bytes.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "rxmon_model=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_max_record_bytes() -> usize {
    rxmon_datafile::DEFAULT_MAX_RECORD_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_paused: false,
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

fn parse_flag(value: &str) -> bool {
    value == "true" || value == "1"
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `RXMON_DATA_FILE` overrides `replay.path`
/// - `RXMON_START_PAUSED` overrides `session.start_paused`
/// - `RXMON_LOG_LEVEL` overrides `logging.level`
/// - `RXMON_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(data_file) = std::env::var("RXMON_DATA_FILE") {
        if !data_file.trim().is_empty() {
            config.replay.path = Some(data_file);
        }
    }
    if let Ok(paused) = std::env::var("RXMON_START_PAUSED") {
        config.session.start_paused = parse_flag(&paused);
    }
    if let Ok(level) = std::env::var("RXMON_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("RXMON_LOG_JSON") {
        config.logging.json = parse_flag(&json);
    }

    Ok(config)
}
