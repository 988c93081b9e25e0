//! Validate subscription records without contacting any webhook

use crate::commands::load_subscriptions;
use crate::controller::validate_record;
use crate::error::{PodwatchError, Result};
use crate::model::SubscriptionRecord;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the validate command
#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    /// YAML file with a list of subscription records
    #[arg(long, short = 's')]
    pub subscriptions: PathBuf,
}

/// Outcome of validating one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// `namespace/name` of the record
    pub key: String,
    /// Condition reason, `Configured` when valid
    pub reason: String,
    /// Problem description, empty when valid
    pub message: String,
}

impl ValidationReport {
    /// Whether the record is valid
    pub fn is_valid(&self) -> bool {
        self.message.is_empty()
    }
}

/// Validate every record
pub fn validate_all(records: &[SubscriptionRecord]) -> Vec<ValidationReport> {
    records
        .iter()
        .map(|record| {
            let key = record.key().to_string();
            match validate_record(record) {
                Ok(()) => ValidationReport {
                    key,
                    reason: "Configured".to_string(),
                    message: String::new(),
                },
                Err(e) => ValidationReport {
                    key,
                    reason: e.reason().to_string(),
                    message: e.to_string(),
                },
            }
        })
        .collect()
}

/// Run the validate command
///
/// Prints one line per record.
///
/// # Errors
///
/// Returns error if the file cannot be loaded or any record is invalid
pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let records = load_subscriptions(&args.subscriptions)?;
    let reports = validate_all(&records);

    for report in &reports {
        if report.is_valid() {
            println!("OK      {}", report.key);
        } else {
            println!("INVALID {} ({}): {}", report.key, report.reason, report.message);
        }
    }

    let invalid: Vec<&ValidationReport> = reports.iter().filter(|r| !r.is_valid()).collect();
    if let Some(first) = invalid.first() {
        return Err(PodwatchError::InvalidSubscription {
            key: first.key.clone(),
            message: format!(
                "{} ({} of {} subscriptions are invalid)",
                first.message,
                invalid.len(),
                reports.len()
            ),
        }
        .into());
    }

    println!("{} subscriptions valid", reports.len());
    Ok(())
}
