//! Cluster collaborators
//!
//! The watcher depends on two external collaborators, both expressed as
//! traits so the engine can run against a real platform client or the
//! in-process implementations in [`memory`]:
//!
//! - [`EventSource`]: opens a cancellable stream of [`InboundEvent`]s
//! - [`ResourceLookup`]: fetches pod snapshots and namespace labels
//!
//! # Design
//!
//! A stream ending is not an error: the watcher treats it as a signal to
//! reconnect. Only failing to open a stream is reported through
//! [`StreamOpenError`].

pub mod memory;

use crate::model::{EventType, InboundEvent, Labels, ResourceSnapshot};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub use memory::{ChannelEventSource, InMemoryCluster, RecordedEventSource};

/// Stream of events produced by an [`EventSource`]
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Errors returned when a watch cannot be opened
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamOpenError {
    /// The event source could not be reached
    #[error("event source unavailable: {0}")]
    Unavailable(String),

    /// The event source rejected the watch request
    #[error("watch rejected: {0}")]
    Rejected(String),
}

/// Errors returned by a [`ResourceLookup`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Object kind
        kind: &'static str,
        /// Object namespace (empty for cluster-scoped objects)
        namespace: String,
        /// Object name
        name: String,
    },

    /// Temporary failure talking to the platform
    #[error("lookup failed: {0}")]
    Transient(String),

    /// The lookup did not finish within its deadline
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Server-side (or client-side) filter for the event watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFilter {
    /// Kind of the involved object, e.g. `Pod`
    pub involved_kind: String,
    /// Required event type
    pub event_type: EventType,
}

impl WatchFilter {
    /// Filter for events of `event_type` about objects of `kind`
    pub fn new(involved_kind: &str, event_type: EventType) -> Self {
        Self {
            involved_kind: involved_kind.to_string(),
            event_type,
        }
    }

    /// Field selector for sources that filter server-side
    ///
    /// # Examples
    ///
    /// ```
    /// use podwatch::cluster::WatchFilter;
    /// use podwatch::model::EventType;
    ///
    /// let filter = WatchFilter::new("Pod", EventType::Warning);
    /// assert_eq!(filter.field_selector(), "involvedObject.kind=Pod,type=Warning");
    /// ```
    pub fn field_selector(&self) -> String {
        format!(
            "involvedObject.kind={},type={}",
            self.involved_kind,
            self.event_type.as_str()
        )
    }

    /// Client-side check for sources that cannot filter
    pub fn matches(&self, event: &InboundEvent) -> bool {
        event.event_type == self.event_type && event.involved_object.kind == self.involved_kind
    }
}

impl Default for WatchFilter {
    fn default() -> Self {
        Self::new("Pod", EventType::Warning)
    }
}

/// Supplier of the live event stream
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new watch
    ///
    /// The returned stream ends when the source closes the watch; the
    /// caller is expected to open a new one.
    ///
    /// # Errors
    ///
    /// Returns [`StreamOpenError`] if the watch cannot be established.
    async fn open(&self, filter: &WatchFilter) -> Result<EventStream, StreamOpenError>;
}

/// Supplier of pod and namespace metadata
#[async_trait::async_trait]
pub trait ResourceLookup: Send + Sync {
    /// Fetch the current snapshot of a pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<ResourceSnapshot, LookupError>;

    /// Fetch the labels of a namespace
    async fn namespace_labels(&self, namespace: &str) -> Result<Labels, LookupError>;
}

/// Run `lookup` under `deadline`, reporting expiry as [`LookupError::Timeout`]
pub async fn with_deadline<T, F>(deadline: Duration, lookup: F) -> Result<T, LookupError>
where
    F: Future<Output = Result<T, LookupError>>,
{
    tokio::time::timeout(deadline, lookup)
        .await
        .unwrap_or(Err(LookupError::Timeout(deadline)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_filter_matches_kind_and_type() {
        let filter = WatchFilter::default();

        let warning = InboundEvent::pod_warning("ns", "worker-1", "BackOff", "");
        assert!(filter.matches(&warning));

        let mut normal = warning.clone();
        normal.event_type = EventType::Normal;
        assert!(!filter.matches(&normal));

        let mut node = warning;
        node.involved_object.kind = "Node".to_string();
        assert!(!filter.matches(&node));
    }

    #[test]
    fn test_lookup_error_display() {
        let err = LookupError::NotFound {
            kind: "Pod",
            namespace: "ns".to_string(),
            name: "worker-1".to_string(),
        };
        assert_eq!(err.to_string(), "Pod ns/worker-1 not found");
    }

    #[test]
    fn test_stream_open_error_display() {
        let err = StreamOpenError::Unavailable("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "event source unavailable: connection refused"
        );
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, LookupError>(Labels::new())
        };
        let err = with_deadline(Duration::from_millis(20), slow)
            .await
            .unwrap_err();
        assert_eq!(err, LookupError::Timeout(Duration::from_millis(20)));
        assert_eq!(err.to_string(), "lookup timed out after 20ms");
    }

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let fast = async { Err::<Labels, _>(LookupError::Transient("busy".to_string())) };
        let err = with_deadline(Duration::from_secs(1), fast).await.unwrap_err();
        assert_eq!(err, LookupError::Transient("busy".to_string()));
    }
}
