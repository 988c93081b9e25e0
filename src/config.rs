//! Configuration management for Podwatch
//!
//! Settings are read from a YAML file, then overridden by `PODWATCH_*`
//! environment variables and CLI flags.

use crate::cli::Cli;
use crate::cluster::WatchFilter;
use crate::error::{PodwatchError, Result};
use crate::model::EventType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Watch loop settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Webhook delivery settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Watch loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Kind of the involved object to watch events for
    #[serde(default = "default_involved_kind")]
    pub involved_kind: String,

    /// Event type to watch for
    #[serde(default = "default_event_type")]
    pub event_type: EventType,

    /// Deadline for pod and namespace lookups and status reports
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,

    /// Stream reconnection policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl WatcherConfig {
    /// Event filter derived from this configuration
    pub fn filter(&self) -> WatchFilter {
        WatchFilter::new(&self.involved_kind, self.event_type)
    }

    /// Lookup deadline as a [`Duration`]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

/// Reconnection policy for the event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay after the first failure
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive open failures before giving up (0 = never)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Webhook delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Request timeout in seconds
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

impl NotifierConfig {
    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default = "default_json_logs")]
    pub json_format: bool,

    /// Log file path (if None, STDOUT only)
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_involved_kind() -> String {
    "Pod".to_string()
}

fn default_event_type() -> EventType {
    EventType::Warning
}

fn default_lookup_timeout() -> u64 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    10
}

fn default_notifier_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            involved_kind: default_involved_kind(),
            event_type: default_event_type(),
            lookup_timeout_secs: default_lookup_timeout(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_notifier_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: default_json_logs(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file, environment and CLI
    ///
    /// A missing file is not an error: defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PodwatchError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PodwatchError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(kind) = std::env::var("PODWATCH_INVOLVED_KIND") {
            tracing::debug!(involved_kind = %kind, "Env override: PODWATCH_INVOLVED_KIND");
            self.watcher.involved_kind = kind;
        }

        if let Some(v) = parse_env::<u64>("PODWATCH_LOOKUP_TIMEOUT_SECS") {
            self.watcher.lookup_timeout_secs = v;
        }

        if let Some(v) = parse_env::<u32>("PODWATCH_RECONNECT_MAX_ATTEMPTS") {
            self.watcher.reconnect.max_attempts = v;
        }

        if let Some(v) = parse_env::<u64>("PODWATCH_RECONNECT_INITIAL_BACKOFF_MS") {
            self.watcher.reconnect.initial_backoff_ms = v;
        }

        if let Some(v) = parse_env::<u64>("PODWATCH_RECONNECT_MAX_BACKOFF_MS") {
            self.watcher.reconnect.max_backoff_ms = v;
        }

        if let Some(v) = parse_env::<u64>("PODWATCH_NOTIFIER_TIMEOUT_SECS") {
            self.notifier.timeout_secs = v;
        }

        if let Ok(level) = std::env::var("PODWATCH_LOG_LEVEL") {
            tracing::debug!(level = %level, "Env override: PODWATCH_LOG_LEVEL");
            self.logging.level = level;
        }

        if let Ok(json) = std::env::var("PODWATCH_JSON_LOGS") {
            match json.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.logging.json_format = true,
                "0" | "false" | "no" => self.logging.json_format = false,
                _ => tracing::warn!("Invalid value for PODWATCH_JSON_LOGS: {}", json),
            }
        }

        if let Ok(file) = std::env::var("PODWATCH_LOG_FILE") {
            tracing::debug!(file = %file, "Env override: PODWATCH_LOG_FILE");
            self.logging.file_path = Some(PathBuf::from(file));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range
    pub fn validate(&self) -> Result<()> {
        if self.watcher.involved_kind.trim().is_empty() {
            return Err(
                PodwatchError::Config("watcher.involved_kind cannot be empty".to_string()).into(),
            );
        }

        if !(1..=300).contains(&self.watcher.lookup_timeout_secs) {
            return Err(PodwatchError::Config(
                "watcher.lookup_timeout_secs must be between 1 and 300".to_string(),
            )
            .into());
        }

        let reconnect = &self.watcher.reconnect;
        if reconnect.initial_backoff_ms == 0 {
            return Err(PodwatchError::Config(
                "watcher.reconnect.initial_backoff_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if reconnect.initial_backoff_ms > reconnect.max_backoff_ms {
            return Err(PodwatchError::Config(
                "watcher.reconnect.initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            )
            .into());
        }

        if reconnect.multiplier.is_nan() || reconnect.multiplier < 1.0 {
            return Err(PodwatchError::Config(
                "watcher.reconnect.multiplier must be at least 1.0".to_string(),
            )
            .into());
        }

        if !(1..=300).contains(&self.notifier.timeout_secs) {
            return Err(PodwatchError::Config(
                "notifier.timeout_secs must be between 1 and 300".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr + std::fmt::Display>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(v) => {
            tracing::debug!(value = %v, "Env override: {}", name);
            Some(v)
        }
        Err(_) => {
            tracing::warn!("Invalid value for {}: {}", name, raw);
            None
        }
    }
}
