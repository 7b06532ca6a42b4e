//! Client and scheduler configuration
//!
//! Loaded from one JSON object; every field is optional:
//!
//! ```json
//! {
//!   "client": { "default_language": "en", "subscription_prefix": "sub" },
//!   "scheduler": { "interval_ms": 100 },
//!   "log": { "level": "warn" }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event, Logger, Severity};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read(_) => "NQ_CONFIG_READ",
            ConfigError::Parse(_) => "NQ_CONFIG_PARSE",
            ConfigError::Invalid(_) => "NQ_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Language used when a query has no `$language`
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Prefix of generated subscription ids
    #[serde(default = "default_subscription_prefix")]
    pub subscription_prefix: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_subscription_prefix() -> String {
    "sub".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            subscription_prefix: default_subscription_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Dirty-poll interval
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// The now bucket fires at most once a second
    pub fn now_every_ticks(&self) -> u64 {
        (1000 / self.interval_ms.max(1)).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl LogConfig {
    pub fn severity(&self) -> ConfigResult<Severity> {
        Severity::parse(&self.level)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        let config = Self::from_json(&content)?;
        let source = path.display().to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("source", source.as_str())],
        );
        Ok(config)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.interval_ms == 0 {
            return Err(ConfigError::Invalid("scheduler.interval_ms must be > 0".into()));
        }
        if self.client.default_language.is_empty() {
            return Err(ConfigError::Invalid("client.default_language must not be empty".into()));
        }
        self.log.severity()?;
        Ok(())
    }

    /// Installs the configured log threshold process-wide
    pub fn apply_logging(&self) -> ConfigResult<()> {
        Logger::set_min_severity(self.log.severity()?);
        Ok(())
    }
}
