//! Configuration types for the scoring service.
//!
//! Loaded from a YAML file, then overridden by environment variables
//! (`SERVER_ADDRESS`, `ANALYSIS_TRACES_TTL`, ...), then validated. Any
//! validation failure is startup-fatal.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration failure; always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logger: LoggerConfig,
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub dataset: DatasetConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Log level: debug, info, warn, warning or error (case-insensitive).
    pub level: String,
}

/// HTTP server settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "0.0.0.0:8080".
    pub address: String,

    /// Directory served under `/static/`; empty disables static serving.
    #[serde(rename = "static")]
    pub static_dir: String,
}

/// Scorer variants an operator can configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Remote ML inference service.
    Ml,
    /// Local rule engine.
    Rules,
}

/// One entry of `analysis.scorers`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    #[serde(rename = "type")]
    pub kind: ScorerKind,

    /// Inference service base URL (ml).
    #[serde(default)]
    pub url: String,

    /// Model identifier sent with every batch (ml).
    #[serde(default)]
    pub model: String,

    /// Path to the YAML rules file (rules).
    #[serde(default)]
    pub rules: String,
}

/// Behavioral analysis settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Name of the session cookie carrying the token.
    pub token: String,

    /// Configured scorers, applied in order.
    pub scorers: Vec<ScorerConfig>,

    /// Ring capacity: traces retained per session.
    pub traces_length: usize,

    /// Idle horizon after which a session is evicted, e.g. "10m".
    #[serde(default, deserialize_with = "duration_str::deserialize")]
    pub traces_ttl: Duration,
}

/// Dataset sink settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset file path; empty disables the sink.
    pub file: String,

    /// Megabytes per segment before rotation.
    pub size: u64,

    /// Rotated segments retained.
    pub amount: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            size: 100,
            amount: 20,
        }
    }
}

const LEVELS: [&str; 5] = ["debug", "info", "warn", "warning", "error"];

impl AppConfig {
    /// Load the configuration from `path`, apply environment overrides and
    /// validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables take priority over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("LOGGER_LEVEL") {
            self.logger.level = v;
        }
        if let Ok(v) = env::var("SERVER_ADDRESS") {
            self.server.address = v;
        }
        if let Ok(v) = env::var("SERVER_STATIC") {
            self.server.static_dir = v;
        }
        if let Ok(v) = env::var("ANALYSIS_TOKEN") {
            self.analysis.token = v;
        }
        if let Some(v) = env_parsed::<usize>("ANALYSIS_TRACES_LENGTH") {
            self.analysis.traces_length = v;
        }
        if let Some(v) = env::var("ANALYSIS_TRACES_TTL")
            .ok()
            .and_then(|v| duration_str::parse(&v).ok())
        {
            self.analysis.traces_ttl = v;
        }
        if let Ok(v) = env::var("DATASET_FILE") {
            self.dataset.file = v;
        }
        if let Some(v) = env_parsed::<u64>("DATASET_SIZE") {
            self.dataset.size = v;
        }
        if let Some(v) = env_parsed::<usize>("DATASET_AMOUNT") {
            self.dataset.amount = v;
        }
    }

    /// Check every section, returning the first error found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logger.validate()?;
        self.server.validate()?;
        self.analysis.validate()?;
        self.dataset.validate()?;
        Ok(())
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl LoggerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.level.is_empty() {
            return Err(ConfigError::Invalid("logger.level: must be specified".into()));
        }
        if !LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logger.level: unsupported level '{}'",
                self.level
            )));
        }
        Ok(())
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::Invalid("server.address: must be specified".into()));
        }
        Ok(())
    }
}

impl ScorerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            ScorerKind::Ml => {
                if self.url.is_empty() {
                    return Err(ConfigError::Invalid("ml scorer: url must be specified".into()));
                }
                if self.model.is_empty() {
                    return Err(ConfigError::Invalid(
                        "ml scorer: model must be specified".into(),
                    ));
                }
            }
            ScorerKind::Rules => {
                if self.rules.is_empty() {
                    return Err(ConfigError::Invalid(
                        "rules scorer: rules file path must be specified".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl AnalysisConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.scorers.is_empty() {
            return Err(ConfigError::Invalid(
                "analysis.scorers: must be specified".into(),
            ));
        }
        for scorer in &self.scorers {
            scorer.validate()?;
        }
        if self.token.is_empty() {
            return Err(ConfigError::Invalid("analysis.token: must be specified".into()));
        }
        if self.traces_length == 0 {
            return Err(ConfigError::Invalid(
                "analysis.traces_length: must be positive".into(),
            ));
        }
        if self.traces_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "analysis.traces_ttl: must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl DatasetConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        // Limits only matter while the sink is enabled. Zero values can
        // arrive through env overrides, which bypass the serde defaults.
        if self.file.is_empty() {
            return Ok(());
        }
        if self.size == 0 {
            return Err(ConfigError::Invalid("dataset.size: must be positive".into()));
        }
        if self.amount == 0 {
            return Err(ConfigError::Invalid("dataset.amount: must be positive".into()));
        }
        Ok(())
    }
}

/// Serde adapter for "10m"-style duration strings.
mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{s}' is missing a unit (ms, s, m, h)"))?;
        let (digits, unit) = s.split_at(split);
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("duration '{s}' has an invalid number"))?;
        match unit {
            "ms" => Ok(Duration::from_millis(n)),
            "s" => Ok(Duration::from_secs(n)),
            "m" => Ok(Duration::from_secs(n * 60)),
            "h" => Ok(Duration::from_secs(n * 3600)),
            _ => Err(format!("duration '{s}' has an unknown unit '{unit}'")),
        }
    }
}
