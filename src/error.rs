//! Error types for Podwatch
//!
//! This module defines the application-level error type used by
//! configuration loading and the CLI commands, using `thiserror` for
//! ergonomic error handling. Component errors (selectors, templates,
//! delivery, streams) live next to the code that produces them.

use thiserror::Error;

/// Main error type for Podwatch operations
///
/// Covers configuration problems, invalid subscription input and the
/// I/O and serialization failures that surface while loading files.
#[derive(Error, Debug)]
pub enum PodwatchError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A subscription record failed validation
    #[error("Invalid subscription {key}: {message}")]
    InvalidSubscription {
        /// Registry key of the offending record
        key: String,
        /// Validation failure description
        message: String,
    },

    /// Watch loop terminated with an unrecoverable error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Podwatch operations
///
/// Uses `anyhow::Error` so application flows can attach context while
/// propagating component errors with `?`.
pub type Result<T> = anyhow::Result<T>;
