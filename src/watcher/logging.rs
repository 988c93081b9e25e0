//! Structured logging setup
//!
//! JSON or human-readable output on STDOUT, optionally mirrored to an
//! append-mode log file. `RUST_LOG` takes precedence over the configured
//! level.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber from `config`
///
/// # Errors
///
/// Returns an error if the level directive is invalid, the log file cannot
/// be opened, or a global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use podwatch::config::LoggingConfig;
/// use podwatch::watcher::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     json_format: true,
///     file_path: None,
/// };
///
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);
    let file = config.file_path.as_deref().map(open_log_file).transpose()?;

    if config.json_format {
        let stdout_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true);

        match file {
            Some(file) => {
                let file_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(Arc::new(file));
                registry.with(stdout_layer).with(file_layer).try_init()?;
            }
            None => registry.with(stdout_layer).try_init()?,
        }
    } else {
        let stdout_layer = fmt::layer().with_target(true).with_level(true);

        match file {
            Some(file) => {
                let file_layer = fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(false)
                    .with_writer(Arc::new(file));
                registry.with(stdout_layer).with(file_layer).try_init()?;
            }
            None => registry.with(stdout_layer).try_init()?,
        }
    }

    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?)
}

fn open_log_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Span carrying the identity of an inbound event
///
/// # Examples
///
/// ```
/// use podwatch::event_fields;
/// use podwatch::model::InboundEvent;
///
/// let event = InboundEvent::pod_warning("ns", "worker-1", "BackOff", "");
/// let span = event_fields!(event);
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! event_fields {
    ($event:expr) => {
        tracing::info_span!(
            "event",
            reason = %$event.reason,
            namespace = %$event.involved_object.namespace,
            pod = %$event.involved_object.name,
            kind = %$event.involved_object.kind,
            event_type = %$event.event_type.as_str()
        )
    };
}
