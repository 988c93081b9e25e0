//! Command handlers for the CLI
//!
//! - [`validate`]: check subscription records for configuration problems
//! - [`replay`]: drive recorded events through the full pipeline
//!
//! Input files are YAML: a list of subscription records, a cluster
//! snapshot, and a list of events.

use crate::cluster::memory::ClusterSnapshot;
use crate::error::{PodwatchError, Result};
use crate::model::{InboundEvent, SubscriptionRecord};
use serde::de::DeserializeOwned;
use std::path::Path;

pub mod replay;
pub mod validate;

/// Load a YAML list of subscription records
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_subscriptions(path: &Path) -> Result<Vec<SubscriptionRecord>> {
    load_yaml(path, "subscriptions")
}

/// Load a YAML cluster snapshot
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_cluster(path: &Path) -> Result<ClusterSnapshot> {
    load_yaml(path, "cluster snapshot")
}

/// Load a YAML list of events
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_events(path: &Path) -> Result<Vec<InboundEvent>> {
    load_yaml(path, "events")
}

fn load_yaml<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PodwatchError::Config(format!(
            "Failed to read {} file {}: {}",
            what,
            path.display(),
            e
        ))
    })?;

    serde_yaml::from_str(&contents).map_err(|e| {
        PodwatchError::Config(format!(
            "Failed to parse {} file {}: {}",
            what,
            path.display(),
            e
        ))
        .into()
    })
}
