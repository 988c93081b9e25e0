//! Subscription reconciliation
//!
//! The [`AlertController`] is the entry point for subscription changes
//! pushed by the configuration-object collaborator. It keeps the registry
//! current, surfaces configuration problems as conditions, and starts the
//! watch loop the first time a subscription is applied.

use crate::cluster::{EventSource, ResourceLookup};
use crate::config::Config;
use crate::error::{PodwatchError, Result};
use crate::model::{Condition, SelectorError, SubscriptionKey, SubscriptionRecord};
use crate::notify::template::{MessageTemplate, TemplateError};
use crate::status::StatusReporter;
use crate::watcher::{AlertRegistry, WatchContext, WatchState, Watcher, WatcherError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A change observed on a subscription object
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionChange {
    /// Created or updated
    Applied(SubscriptionRecord),
    /// Deleted
    Deleted(SubscriptionKey),
}

/// Configuration problems found on a subscription
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Webhook URL is not an absolute http(s) URL
    #[error("invalid webhook URL '{url}': {message}")]
    WebhookUrl {
        /// URL as configured
        url: String,
        /// Parse or scheme problem
        message: String,
    },

    /// Namespace selector does not compile
    #[error("invalid namespace selector: {0}")]
    NamespaceSelector(SelectorError),

    /// Pod selector does not compile
    #[error("invalid pod selector: {0}")]
    PodSelector(SelectorError),

    /// Message template does not parse
    #[error("invalid message template: {0}")]
    Template(TemplateError),
}

impl ValidationError {
    /// Condition reason for this problem
    pub fn reason(&self) -> &'static str {
        match self {
            Self::WebhookUrl { .. } => "InvalidWebhookUrl",
            Self::NamespaceSelector(_) => "InvalidNamespaceSelector",
            Self::PodSelector(_) => "InvalidPodSelector",
            Self::Template(_) => "InvalidTemplate",
        }
    }
}

/// Check a record for configuration problems
///
/// # Errors
///
/// Returns the first [`ValidationError`] found, checking the webhook URL,
/// the namespace selector, the pod selector and the template in that order.
///
/// # Examples
///
/// ```
/// use podwatch::controller::validate_record;
/// use podwatch::model::SubscriptionRecord;
///
/// let mut record = SubscriptionRecord::new("ns", "a", "https://hooks.example.com/T0");
/// assert!(validate_record(&record).is_ok());
///
/// record.spec.message_template = "%s restarted".to_string();
/// assert_eq!(validate_record(&record).unwrap_err().reason(), "InvalidTemplate");
/// ```
pub fn validate_record(record: &SubscriptionRecord) -> std::result::Result<(), ValidationError> {
    let spec = &record.spec;

    let webhook_error = |message: String| ValidationError::WebhookUrl {
        url: spec.webhook_url.clone(),
        message,
    };
    let url = url::Url::parse(&spec.webhook_url).map_err(|e| webhook_error(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(webhook_error(format!("unsupported scheme '{}'", url.scheme())));
    }

    if let Some(selector) = &spec.namespace_selector {
        selector
            .compile()
            .map_err(ValidationError::NamespaceSelector)?;
    }

    if let Some(selector) = &spec.pod_selector {
        selector.compile().map_err(ValidationError::PodSelector)?;
    }

    if !spec.message_template.is_empty() {
        MessageTemplate::parse(&spec.message_template).map_err(ValidationError::Template)?;
    }

    Ok(())
}

/// `Ready` condition describing the validity of `record`
pub fn readiness(record: &SubscriptionRecord) -> Condition {
    match validate_record(record) {
        Ok(()) => Condition::ready("Configured"),
        Err(e) => Condition::not_ready(e.reason(), e.to_string()),
    }
}

/// Reconciles subscription changes and owns the watch loop
pub struct AlertController {
    registry: Arc<AlertRegistry>,
    watcher: Arc<Watcher>,
    status: Arc<dyn StatusReporter>,
    status_timeout: Duration,
    token: CancellationToken,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<std::result::Result<(), WatcherError>>>>,
}

impl AlertController {
    /// Create a controller; the watch loop is not started yet
    ///
    /// # Arguments
    ///
    /// * `config` - Watcher and notifier settings
    /// * `source` - Event stream supplier
    /// * `lookup` - Pod and namespace metadata supplier
    /// * `status` - Status sink for deliveries and conditions
    pub fn new(
        config: &Config,
        source: Arc<dyn EventSource>,
        lookup: Arc<dyn ResourceLookup>,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        let registry = Arc::new(AlertRegistry::new(config.notifier.timeout()));
        let watcher = Arc::new(Watcher::new(
            &config.watcher,
            source,
            lookup,
            Arc::clone(&registry),
            Arc::clone(&status),
        ));

        Self {
            registry,
            watcher,
            status,
            status_timeout: config.watcher.lookup_timeout(),
            token: CancellationToken::new(),
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Subscription registry
    pub fn registry(&self) -> &Arc<AlertRegistry> {
        &self.registry
    }

    /// Receiver observing watch loop state
    pub fn watch_state(&self) -> watch::Receiver<WatchState> {
        self.watcher.subscribe_state()
    }

    /// Whether the watch loop has been started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Apply a subscription change
    ///
    /// Every applied change first makes sure the watch loop is running.
    pub async fn reconcile(&self, change: SubscriptionChange) {
        match change {
            SubscriptionChange::Applied(record) => {
                self.ensure_started().await;

                let key = record.key();
                if record.is_deleting() {
                    debug!(subscription = %key, "Subscription is being deleted");
                    self.registry.remove(&key);
                    return;
                }

                let condition = readiness(&record);
                if condition.status {
                    info!(subscription = %key, enabled = record.spec.enabled, "Subscription configured");
                } else {
                    warn!(
                        subscription = %key,
                        reason = %condition.reason,
                        message = %condition.message,
                        "Subscription misconfigured"
                    );
                }
                self.report_condition(&key, condition).await;

                self.registry.upsert(record);
            }
            SubscriptionChange::Deleted(key) => {
                info!(subscription = %key, "Subscription deleted");
                self.registry.remove(&key);
            }
        }
    }

    async fn report_condition(&self, key: &SubscriptionKey, condition: Condition) {
        let report = self.status.set_condition(key, condition);
        match tokio::time::timeout(self.status_timeout, report).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(subscription = %key, error = %e, "Failed to report condition"),
            Err(_) => warn!(subscription = %key, "Condition report timed out"),
        }
    }

    async fn ensure_started(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!("Starting watch loop");
        let watcher = Arc::clone(&self.watcher);
        let ctx = WatchContext::new(self.token.child_token());
        let handle = tokio::spawn(async move {
            let result = watcher.run(ctx).await;
            if let Err(e) = &result {
                error!(error = %e, "Watch loop terminated");
            }
            result
        });

        *self.handle.lock().await = Some(handle);
    }

    /// Cancel the watch loop and wait for it to exit
    ///
    /// # Errors
    ///
    /// Returns the loop's own error if it had already given up, or an
    /// error if the task panicked.
    pub async fn shutdown(&self) -> Result<()> {
        self.token.cancel();

        let handle = self.handle.lock().await.take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(PodwatchError::Watcher(format!("watch task failed: {}", e)).into()),
        }
    }
}
