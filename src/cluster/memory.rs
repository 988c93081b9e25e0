//! In-process cluster collaborators
//!
//! These implementations back the `replay` command and the test suite:
//!
//! - [`InMemoryCluster`]: pod and namespace metadata held in memory
//! - [`ChannelEventSource`]: each watch is a pre-queued channel session
//! - [`RecordedEventSource`]: replays a fixed event list once

use super::{EventSource, EventStream, LookupError, ResourceLookup, StreamOpenError, WatchFilter};
use crate::model::{InboundEvent, Labels, ResourceSnapshot};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;

/// Serializable cluster state used to seed an [`InMemoryCluster`]
///
/// # Examples
///
/// ```
/// use podwatch::cluster::memory::ClusterSnapshot;
///
/// let yaml = r#"
/// namespaces:
///   payments:
///     env: prod
/// pods:
///   - name: api-0
///     namespace: payments
///     labels: { tier: backend }
///     containers:
///       - { name: app, restartCount: 2 }
/// "#;
/// let snapshot: ClusterSnapshot = serde_yaml::from_str(yaml).unwrap();
/// assert_eq!(snapshot.pods.len(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Namespace name to labels
    #[serde(default)]
    pub namespaces: BTreeMap<String, Labels>,
    /// Pods
    #[serde(default)]
    pub pods: Vec<ResourceSnapshot>,
}

/// Pod and namespace metadata held in memory
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    pods: RwLock<HashMap<(String, String), ResourceSnapshot>>,
    namespaces: RwLock<HashMap<String, Labels>>,
    unavailable: AtomicBool,
}

impl InMemoryCluster {
    /// Empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster seeded from a snapshot
    pub fn from_snapshot(snapshot: ClusterSnapshot) -> Self {
        let cluster = Self::new();
        for (name, labels) in snapshot.namespaces {
            cluster.insert_namespace(&name, labels);
        }
        for pod in snapshot.pods {
            cluster.insert_pod(pod);
        }
        cluster
    }

    /// Insert or replace a pod
    pub fn insert_pod(&self, pod: ResourceSnapshot) {
        if let Ok(mut pods) = self.pods.write() {
            pods.insert((pod.namespace.clone(), pod.name.clone()), pod);
        }
    }

    /// Remove a pod
    pub fn remove_pod(&self, namespace: &str, name: &str) {
        if let Ok(mut pods) = self.pods.write() {
            pods.remove(&(namespace.to_string(), name.to_string()));
        }
    }

    /// Insert or replace a namespace and its labels
    pub fn insert_namespace(&self, name: &str, labels: Labels) {
        if let Ok(mut namespaces) = self.namespaces.write() {
            namespaces.insert(name.to_string(), labels);
        }
    }

    /// Make every lookup fail with a transient error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), LookupError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LookupError::Transient("cluster unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceLookup for InMemoryCluster {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<ResourceSnapshot, LookupError> {
        self.check_available()?;
        let pods = self
            .pods
            .read()
            .map_err(|_| LookupError::Transient("pod store poisoned".to_string()))?;
        pods.get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                kind: "Pod",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn namespace_labels(&self, namespace: &str) -> Result<Labels, LookupError> {
        self.check_available()?;
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| LookupError::Transient("namespace store poisoned".to_string()))?;
        namespaces
            .get(namespace)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                kind: "Namespace",
                namespace: String::new(),
                name: namespace.to_string(),
            })
    }
}

/// Event source whose watches are channel sessions queued ahead of time
///
/// Every [`ChannelEventSource::session`] call queues one future watch.
/// Opening a watch pops the oldest session; dropping its sender ends the
/// stream. Opening with no session queued fails with
/// [`StreamOpenError::Unavailable`].
///
/// # Examples
///
/// ```
/// use podwatch::cluster::{ChannelEventSource, EventSource, WatchFilter};
///
/// # async fn example() {
/// let source = ChannelEventSource::new();
/// let tx = source.session(8);
/// let stream = source.open(&WatchFilter::default()).await;
/// assert!(stream.is_ok());
/// drop(tx);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ChannelEventSource {
    sessions: Mutex<VecDeque<mpsc::Receiver<InboundEvent>>>,
    opens: AtomicUsize,
    last_filter: Mutex<Option<WatchFilter>>,
}

impl ChannelEventSource {
    /// Source with no queued sessions
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a watch session and return its sender
    pub fn session(&self, capacity: usize) -> mpsc::Sender<InboundEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push_back(rx);
        }
        tx
    }

    /// Number of `open` calls so far, successful or not
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Filter passed to the most recent `open`
    pub fn last_filter(&self) -> Option<WatchFilter> {
        self.last_filter.lock().ok().and_then(|f| f.clone())
    }
}

#[async_trait::async_trait]
impl EventSource for ChannelEventSource {
    async fn open(&self, filter: &WatchFilter) -> Result<EventStream, StreamOpenError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_filter.lock() {
            *last = Some(filter.clone());
        }

        let next = self
            .sessions
            .lock()
            .map_err(|_| StreamOpenError::Unavailable("session queue poisoned".to_string()))?
            .pop_front();

        match next {
            Some(rx) => Ok(Box::pin(ReceiverStream::new(rx))),
            None => Err(StreamOpenError::Unavailable(
                "no watch session available".to_string(),
            )),
        }
    }
}

/// Event source that replays a recorded event list once
///
/// The first watch yields the recorded events and then closes; later
/// watches stay open without yielding anything. [`Self::exhausted`]
/// resolves once the recorded stream has been fully consumed. A source
/// built with [`Self::held`] yields nothing until [`Self::release`].
#[derive(Debug)]
pub struct RecordedEventSource {
    events: Vec<InboundEvent>,
    replayed: AtomicBool,
    exhausted: Arc<Notify>,
    start: Option<Arc<Notify>>,
}

impl RecordedEventSource {
    /// Source replaying `events` in order
    pub fn new(events: Vec<InboundEvent>) -> Self {
        Self {
            events,
            replayed: AtomicBool::new(false),
            exhausted: Arc::new(Notify::new()),
            start: None,
        }
    }

    /// Source that holds `events` back until [`Self::release`] is called
    pub fn held(events: Vec<InboundEvent>) -> Self {
        Self {
            start: Some(Arc::new(Notify::new())),
            ..Self::new(events)
        }
    }

    /// Let a held source start yielding
    pub fn release(&self) {
        if let Some(start) = &self.start {
            start.notify_one();
        }
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when there is nothing to replay
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Wait until the consumer has pulled past the last recorded event
    pub async fn exhausted(&self) {
        self.exhausted.notified().await;
    }
}

#[async_trait::async_trait]
impl EventSource for RecordedEventSource {
    async fn open(&self, _filter: &WatchFilter) -> Result<EventStream, StreamOpenError> {
        if self.replayed.swap(true, Ordering::SeqCst) {
            return Ok(Box::pin(stream::pending::<InboundEvent>()));
        }

        let start = self.start.clone();
        let head = stream::once(async move {
            if let Some(start) = start {
                start.notified().await;
            }
        })
        .filter_map(|()| async { None::<InboundEvent> });

        let done = Arc::clone(&self.exhausted);
        let tail = stream::once(async move {
            done.notify_one();
        })
        .filter_map(|()| async { None::<InboundEvent> });

        Ok(Box::pin(
            head.chain(stream::iter(self.events.clone())).chain(tail),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_in_memory_cluster_lookup() {
        let cluster = InMemoryCluster::new();
        cluster.insert_pod(ResourceSnapshot::new("ns", "worker-1").with_container("app", 3));
        cluster.insert_namespace(
            "ns",
            Labels::from([("env".to_string(), "prod".to_string())]),
        );

        let pod = cluster.get_pod("ns", "worker-1").await.unwrap();
        assert_eq!(pod.containers[0].restart_count, 3);

        let labels = cluster.namespace_labels("ns").await.unwrap();
        assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn test_in_memory_cluster_not_found() {
        let cluster = InMemoryCluster::new();
        let err = cluster.get_pod("ns", "missing").await.unwrap_err();
        assert!(matches!(err, LookupError::NotFound { kind: "Pod", .. }));

        let err = cluster.namespace_labels("missing").await.unwrap_err();
        assert!(matches!(err, LookupError::NotFound { kind: "Namespace", .. }));
    }

    #[tokio::test]
    async fn test_in_memory_cluster_unavailable() {
        let cluster = InMemoryCluster::new();
        cluster.insert_pod(ResourceSnapshot::new("ns", "worker-1"));
        cluster.set_unavailable(true);
        assert!(matches!(
            cluster.get_pod("ns", "worker-1").await,
            Err(LookupError::Transient(_))
        ));

        cluster.set_unavailable(false);
        assert!(cluster.get_pod("ns", "worker-1").await.is_ok());

        cluster.remove_pod("ns", "worker-1");
        assert!(cluster.get_pod("ns", "worker-1").await.is_err());
    }

    #[tokio::test]
    async fn test_channel_source_sessions_in_order() {
        let source = ChannelEventSource::new();
        let first = source.session(4);
        let second = source.session(4);

        first
            .send(InboundEvent::pod_warning("ns", "a", "BackOff", ""))
            .await
            .unwrap();
        drop(first);
        second
            .send(InboundEvent::pod_warning("ns", "b", "BackOff", ""))
            .await
            .unwrap();
        drop(second);

        let filter = WatchFilter::default();
        let events: Vec<_> = source.open(&filter).await.unwrap().collect().await;
        assert_eq!(events[0].involved_object.name, "a");
        let events: Vec<_> = source.open(&filter).await.unwrap().collect().await;
        assert_eq!(events[0].involved_object.name, "b");

        assert!(source.open(&filter).await.is_err());
        assert_eq!(source.opens(), 3);
        assert_eq!(source.last_filter(), Some(filter));
    }

    #[tokio::test]
    async fn test_recorded_source_replays_once() {
        let source = RecordedEventSource::new(vec![
            InboundEvent::pod_warning("ns", "a", "BackOff", ""),
            InboundEvent::pod_warning("ns", "b", "Killing", ""),
        ]);
        assert_eq!(source.len(), 2);

        let filter = WatchFilter::default();
        let events: Vec<_> = source.open(&filter).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);

        tokio::time::timeout(Duration::from_secs(1), source.exhausted())
            .await
            .expect("exhaustion should be signalled");

        let mut second = source.open(&filter).await.unwrap();
        let next = tokio::time::timeout(Duration::from_millis(50), second.next()).await;
        assert!(next.is_err(), "later watches should stay open and idle");
    }

    #[tokio::test]
    async fn test_held_source_waits_for_release() {
        let source = RecordedEventSource::held(vec![InboundEvent::pod_warning(
            "ns", "a", "BackOff", "",
        )]);

        let mut stream = source.open(&WatchFilter::default()).await.unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(early.is_err(), "held source should not yield before release");

        source.release();
        let event = stream.next().await.expect("released event");
        assert_eq!(event.involved_object.name, "a");
    }

    #[test]
    fn test_cluster_from_snapshot() {
        let snapshot = ClusterSnapshot {
            namespaces: BTreeMap::from([("ns".to_string(), Labels::new())]),
            pods: vec![ResourceSnapshot::new("ns", "worker-1")],
        };
        let cluster = InMemoryCluster::from_snapshot(snapshot);
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(cluster.get_pod("ns", "worker-1")).is_ok());
    }
}
