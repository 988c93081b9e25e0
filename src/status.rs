//! Status reporting
//!
//! Delivery counters and configuration conditions are persisted by an
//! external system. The watcher and controller talk to it through the
//! [`StatusReporter`] trait and treat every call as best-effort: a failed
//! report is logged and never turns a successful delivery into a failure.

use crate::model::{Condition, SubscriptionKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

/// Errors returned by a [`StatusReporter`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// The status store rejected or could not accept the update
    #[error("status update failed: {0}")]
    Update(String),
}

/// Sink for subscription status updates
#[async_trait::async_trait]
pub trait StatusReporter: Send + Sync {
    /// Record a successful delivery
    ///
    /// # Arguments
    ///
    /// * `key` - Subscription that delivered
    /// * `at` - Delivery time
    /// * `count` - Cumulative delivery count including this one
    async fn record_delivery(
        &self,
        key: &SubscriptionKey,
        at: DateTime<Utc>,
        count: u32,
    ) -> Result<(), StatusError>;

    /// Publish a condition for a subscription
    async fn set_condition(
        &self,
        key: &SubscriptionKey,
        condition: Condition,
    ) -> Result<(), StatusError>;
}

/// Reporter that only logs updates
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStatusReporter;

#[async_trait::async_trait]
impl StatusReporter for LoggingStatusReporter {
    async fn record_delivery(
        &self,
        key: &SubscriptionKey,
        at: DateTime<Utc>,
        count: u32,
    ) -> Result<(), StatusError> {
        info!(subscription = %key, last_event_time = %at, event_count = count, "Delivery recorded");
        Ok(())
    }

    async fn set_condition(
        &self,
        key: &SubscriptionKey,
        condition: Condition,
    ) -> Result<(), StatusError> {
        info!(
            subscription = %key,
            condition = %condition.condition_type,
            status = condition.status,
            reason = %condition.reason,
            message = %condition.message,
            "Condition updated"
        );
        Ok(())
    }
}

/// Status as last reported for one subscription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportedStatus {
    /// Last reported delivery time
    pub last_event_time: Option<DateTime<Utc>>,
    /// Last reported delivery count
    pub event_count: u32,
    /// Number of delivery reports received
    pub reports: usize,
    /// Latest condition per condition type
    pub conditions: HashMap<String, Condition>,
}

/// Reporter that keeps the latest status per subscription in memory
///
/// # Examples
///
/// ```
/// use podwatch::model::SubscriptionKey;
/// use podwatch::status::{InMemoryStatusReporter, StatusReporter};
///
/// # tokio_test::block_on(async {
/// let reporter = InMemoryStatusReporter::new();
/// let key = SubscriptionKey::new("ns", "app-alerts");
/// reporter.record_delivery(&key, chrono::Utc::now(), 1).await.unwrap();
/// assert_eq!(reporter.get(&key).unwrap().event_count, 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStatusReporter {
    statuses: Mutex<HashMap<SubscriptionKey, ReportedStatus>>,
    failing: std::sync::atomic::AtomicBool,
}

impl InMemoryStatusReporter {
    /// Empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Reported status of `key`
    pub fn get(&self, key: &SubscriptionKey) -> Option<ReportedStatus> {
        self.statuses.lock().ok()?.get(key).cloned()
    }

    /// All reported statuses, sorted by key
    pub fn all(&self) -> Vec<(SubscriptionKey, ReportedStatus)> {
        let mut all: Vec<_> = self
            .statuses
            .lock()
            .map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Make every update fail
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn update(
        &self,
        key: &SubscriptionKey,
        apply: impl FnOnce(&mut ReportedStatus),
    ) -> Result<(), StatusError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StatusError::Update("status store unavailable".to_string()));
        }
        let mut statuses = self
            .statuses
            .lock()
            .map_err(|_| StatusError::Update("status store poisoned".to_string()))?;
        apply(statuses.entry(key.clone()).or_default());
        Ok(())
    }
}

#[async_trait::async_trait]
impl StatusReporter for InMemoryStatusReporter {
    async fn record_delivery(
        &self,
        key: &SubscriptionKey,
        at: DateTime<Utc>,
        count: u32,
    ) -> Result<(), StatusError> {
        self.update(key, |status| {
            status.last_event_time = Some(at);
            status.event_count = count;
            status.reports += 1;
        })
    }

    async fn set_condition(
        &self,
        key: &SubscriptionKey,
        condition: Condition,
    ) -> Result<(), StatusError> {
        self.update(key, |status| {
            status
                .conditions
                .insert(condition.condition_type.clone(), condition);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_reporter_records_delivery() {
        let reporter = InMemoryStatusReporter::new();
        let key = SubscriptionKey::new("ns", "app-alerts");
        let at = Utc::now();

        reporter.record_delivery(&key, at, 1).await.unwrap();
        reporter.record_delivery(&key, at, 2).await.unwrap();

        let status = reporter.get(&key).unwrap();
        assert_eq!(status.event_count, 2);
        assert_eq!(status.reports, 2);
        assert_eq!(status.last_event_time, Some(at));
    }

    #[tokio::test]
    async fn test_in_memory_reporter_keeps_latest_condition() {
        let reporter = InMemoryStatusReporter::new();
        let key = SubscriptionKey::new("ns", "app-alerts");

        reporter
            .set_condition(&key, Condition::not_ready("InvalidTemplate", "bad"))
            .await
            .unwrap();
        reporter
            .set_condition(&key, Condition::ready("Configured"))
            .await
            .unwrap();

        let status = reporter.get(&key).unwrap();
        let ready = &status.conditions[Condition::READY];
        assert!(ready.status);
        assert_eq!(ready.reason, "Configured");
    }

    #[tokio::test]
    async fn test_in_memory_reporter_failing() {
        let reporter = InMemoryStatusReporter::new();
        reporter.set_failing(true);
        let key = SubscriptionKey::new("ns", "a");
        assert!(reporter.record_delivery(&key, Utc::now(), 1).await.is_err());
        assert!(reporter.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_all_is_sorted() {
        let reporter = InMemoryStatusReporter::new();
        let b = SubscriptionKey::new("ns", "b");
        let a = SubscriptionKey::new("ns", "a");
        reporter.record_delivery(&b, Utc::now(), 1).await.unwrap();
        reporter.record_delivery(&a, Utc::now(), 1).await.unwrap();

        let keys: Vec<String> = reporter.all().into_iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["ns/a", "ns/b"]);
    }

    #[tokio::test]
    async fn test_logging_reporter_never_fails() {
        let reporter = LoggingStatusReporter;
        let key = SubscriptionKey::new("ns", "a");
        assert!(reporter.record_delivery(&key, Utc::now(), 3).await.is_ok());
        assert!(reporter
            .set_condition(&key, Condition::ready("Configured"))
            .await
            .is_ok());
    }
}
