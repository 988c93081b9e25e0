//! Replay recorded events through the full alerting pipeline
//!
//! Subscriptions are applied through the controller, the recorded events
//! are streamed once through the watcher, and deliveries go to the real
//! webhooks of the subscriptions. The command exits once every recorded
//! event has been handled.

use crate::cluster::memory::ClusterSnapshot;
use crate::cluster::{InMemoryCluster, RecordedEventSource};
use crate::commands::{load_cluster, load_events, load_subscriptions};
use crate::config::Config;
use crate::controller::{AlertController, SubscriptionChange};
use crate::error::Result;
use crate::model::{InboundEvent, SubscriptionKey, SubscriptionRecord};
use crate::status::{InMemoryStatusReporter, ReportedStatus};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Arguments for the replay command
#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// YAML file with a list of subscription records
    #[arg(long, short = 's')]
    pub subscriptions: PathBuf,

    /// YAML cluster snapshot (namespaces and pods)
    #[arg(long)]
    pub cluster: PathBuf,

    /// YAML list of recorded events
    #[arg(long, short = 'e')]
    pub events: PathBuf,

    /// Give up waiting for the replay after this many seconds
    #[arg(long, default_value = "300")]
    pub timeout_secs: u64,
}

/// Replay `events` against `records` and return the reported statuses
///
/// # Errors
///
/// Returns error if the watch loop fails
pub async fn replay(
    config: &Config,
    records: Vec<SubscriptionRecord>,
    cluster: ClusterSnapshot,
    events: Vec<InboundEvent>,
    timeout: Duration,
) -> Result<Vec<(SubscriptionKey, ReportedStatus)>> {
    let source = Arc::new(RecordedEventSource::held(events));
    let status = Arc::new(InMemoryStatusReporter::new());
    let controller = AlertController::new(
        config,
        source.clone(),
        Arc::new(InMemoryCluster::from_snapshot(cluster)),
        status.clone(),
    );

    if records.is_empty() {
        warn!("No subscriptions to replay against");
        return Ok(Vec::new());
    }

    info!(
        subscriptions = records.len(),
        events = source.len(),
        "Starting replay"
    );
    for record in records {
        controller
            .reconcile(SubscriptionChange::Applied(record))
            .await;
    }
    source.release();

    tokio::select! {
        _ = source.exhausted() => info!("Recorded events handled"),
        _ = tokio::time::sleep(timeout) => warn!("Replay timed out before all events were handled"),
        _ = tokio::signal::ctrl_c() => warn!("Replay interrupted"),
    }

    controller.shutdown().await?;
    Ok(status.all())
}

/// Run the replay command
///
/// # Errors
///
/// Returns error if an input file cannot be loaded or the watch loop fails
pub async fn run_replay(config: Config, args: ReplayArgs) -> Result<()> {
    let records = load_subscriptions(&args.subscriptions)?;
    let cluster = load_cluster(&args.cluster)?;
    let events = load_events(&args.events)?;

    let statuses = replay(
        &config,
        records,
        cluster,
        events,
        Duration::from_secs(args.timeout_secs),
    )
    .await?;

    println!("Replay results:");
    for (key, status) in statuses {
        let ready = status
            .conditions
            .get(crate::model::Condition::READY)
            .map(|c| c.reason.as_str())
            .unwrap_or("Unknown");
        let last = status
            .last_event_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<40} ready={:<26} deliveries={:<4} last={}",
            key.to_string(),
            ready,
            status.event_count,
            last
        );
    }

    Ok(())
}
