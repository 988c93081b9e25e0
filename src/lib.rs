//! Podwatch - pod restart alerts for chat webhooks
//!
//! Podwatch watches pod warning events, classifies the ones that denote a
//! container restart, and posts an alert to the incoming webhook of every
//! subscription whose namespace and pod selectors match the pod.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `model`: subscription records, events, pod snapshots and label selectors
//! - `cluster`: event source and metadata lookup traits plus in-memory versions
//! - `notify`: webhook message building and delivery
//! - `status`: delivery and condition reporting
//! - `watcher`: registry, classifier, matcher and the watch loop
//! - `controller`: subscription reconciliation and watch loop startup
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use podwatch::cluster::{ChannelEventSource, InMemoryCluster};
//! use podwatch::controller::{AlertController, SubscriptionChange};
//! use podwatch::model::SubscriptionRecord;
//! use podwatch::status::LoggingStatusReporter;
//! use podwatch::Config;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let controller = AlertController::new(
//!         &config,
//!         Arc::new(ChannelEventSource::new()),
//!         Arc::new(InMemoryCluster::new()),
//!         Arc::new(LoggingStatusReporter),
//!     );
//!     let record = SubscriptionRecord::new("ns", "app-alerts", "https://hooks.example.com/T0");
//!     controller.reconcile(SubscriptionChange::Applied(record)).await;
//!     controller.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod cluster;
pub mod commands;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod notify;
pub mod status;
pub mod watcher;

// Re-export commonly used types
pub use config::Config;
pub use controller::{AlertController, SubscriptionChange};
pub use error::{PodwatchError, Result};
pub use model::{InboundEvent, ResourceSnapshot, SubscriptionKey, SubscriptionRecord};
pub use notify::{DeliveryError, SlackNotifier};
pub use watcher::{AlertRegistry, Watcher};
