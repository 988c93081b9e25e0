//! Data model shared by the watcher, notifier and controller
//!
//! - [`SubscriptionRecord`]: a named alert rule (webhook target plus
//!   optional namespace/pod filters) with its mirrored delivery status
//! - [`InboundEvent`]: a platform event referencing a workload instance
//! - [`ResourceSnapshot`]: pod metadata fetched on demand per event
//! - [`selector`]: label selector model and evaluation

pub mod selector;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use selector::{LabelSelector, LabelSelectorRequirement, Labels, Selector, SelectorError};

/// Registry key of a subscription: `(namespace, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// Namespace of the subscription object
    pub namespace: String,
    /// Name of the subscription object
    pub name: String,
}

impl SubscriptionKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Object metadata of a subscription record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
    /// Set once the object is being deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// Desired behavior of a subscription
///
/// Empty strings for `channel`, `username` and `message_template` mean
/// "not set".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Incoming-webhook URL messages are posted to
    pub webhook_url: String,

    /// Channel override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,

    /// Username override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    /// Only alert for pods in namespaces matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Only alert for pods matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    /// Whether deliveries are active
    #[serde(default)]
    pub enabled: bool,

    /// Custom text template (see [`crate::notify::template`])
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_template: String,
}

/// Condition reported on a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `Ready`
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Whether the condition holds
    pub status: bool,
    /// Machine-readable reason
    pub reason: String,
    /// Human-readable detail
    #[serde(default)]
    pub message: String,
    /// When the condition was computed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Condition type used for configuration validity
    pub const READY: &'static str = "Ready";

    /// `Ready=True` with the given reason
    pub fn ready(reason: &str) -> Self {
        Self {
            condition_type: Self::READY.to_string(),
            status: true,
            reason: reason.to_string(),
            message: String::new(),
            last_transition_time: Utc::now(),
        }
    }

    /// `Ready=False` with the given reason and message
    pub fn not_ready(reason: &str, message: impl Into<String>) -> Self {
        Self {
            condition_type: Self::READY.to_string(),
            status: false,
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Delivery counters, owned by the external status subsystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// Reported conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Time of the last successful delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_time: Option<DateTime<Utc>>,
    /// Cumulative number of successful deliveries
    #[serde(default)]
    pub event_count: u32,
}

/// A subscription: metadata, spec and mirrored status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Object metadata
    pub metadata: RecordMeta,
    /// Desired behavior
    pub spec: SubscriptionSpec,
    /// Mirrored status
    #[serde(default)]
    pub status: SubscriptionStatus,
}

impl SubscriptionRecord {
    /// Enabled record without selectors or template
    ///
    /// # Examples
    ///
    /// ```
    /// use podwatch::model::SubscriptionRecord;
    ///
    /// let record = SubscriptionRecord::new("ns", "app-alerts", "https://hooks.example.com/T0");
    /// assert_eq!(record.key().to_string(), "ns/app-alerts");
    /// assert!(record.spec.enabled);
    /// ```
    pub fn new(namespace: &str, name: &str, webhook_url: &str) -> Self {
        Self {
            metadata: RecordMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                deletion_timestamp: None,
            },
            spec: SubscriptionSpec {
                webhook_url: webhook_url.to_string(),
                enabled: true,
                ..Default::default()
            },
            status: SubscriptionStatus::default(),
        }
    }

    /// Registry key of this record
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Whether the object is being deleted
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// Emission class of an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Informational
    #[default]
    Normal,
    /// Abnormal condition
    Warning,
}

impl EventType {
    /// Name as used in field selectors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

/// Reference to the object an event is about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    /// Object kind, e.g. `Pod`
    pub kind: String,
    /// Object name
    pub name: String,
    /// Object namespace
    #[serde(default)]
    pub namespace: String,
}

/// Event received from the event stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Event object name
    #[serde(default)]
    pub name: String,
    /// Short machine-readable reason, e.g. `BackOff`
    pub reason: String,
    /// Free-text message
    #[serde(default)]
    pub message: String,
    /// Object the event is about
    pub involved_object: ObjectReference,
    /// Emission class
    #[serde(rename = "type", default)]
    pub event_type: EventType,
}

impl InboundEvent {
    /// Warning event about a pod
    ///
    /// # Examples
    ///
    /// ```
    /// use podwatch::model::{EventType, InboundEvent};
    ///
    /// let event = InboundEvent::pod_warning("ns", "worker-1", "BackOff", "Back-off restarting");
    /// assert_eq!(event.involved_object.kind, "Pod");
    /// assert_eq!(event.event_type, EventType::Warning);
    /// ```
    pub fn pod_warning(namespace: &str, pod: &str, reason: &str, message: &str) -> Self {
        Self {
            name: format!("{}.event", pod),
            reason: reason.to_string(),
            message: message.to_string(),
            involved_object: ObjectReference {
                kind: "Pod".to_string(),
                name: pod.to_string(),
                namespace: namespace.to_string(),
            },
            event_type: EventType::Warning,
        }
    }
}

/// Per-container restart information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    /// Container name
    pub name: String,
    /// Number of restarts observed by the platform
    #[serde(default)]
    pub restart_count: u32,
}

/// Pod metadata fetched for each qualifying event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Pod name
    pub name: String,
    /// Pod namespace
    pub namespace: String,
    /// Pod labels
    #[serde(default)]
    pub labels: Labels,
    /// Container statuses in platform order
    #[serde(default)]
    pub containers: Vec<ContainerStatus>,
}

impl ResourceSnapshot {
    /// Pod without labels or containers
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a container status
    pub fn with_container(mut self, name: &str, restart_count: u32) -> Self {
        self.containers.push(ContainerStatus {
            name: name.to_string(),
            restart_count,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_key_display() {
        let key = SubscriptionKey::new("ns", "app-alerts");
        assert_eq!(key.to_string(), "ns/app-alerts");
    }

    #[test]
    fn test_subscription_record_from_yaml() {
        let yaml = r##"
metadata:
  name: app-alerts
  namespace: ns
spec:
  webhookUrl: https://hooks.example.com/services/T0
  channel: "#alerts"
  enabled: true
  podSelector:
    matchLabels:
      tier: backend
  messageTemplate: "Pod %s in %s: %s (%s)"
status:
  eventCount: 4
"##;
        let record: SubscriptionRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(record.key(), SubscriptionKey::new("ns", "app-alerts"));
        assert_eq!(record.spec.channel, "#alerts");
        assert!(record.spec.username.is_empty());
        assert!(record.spec.enabled);
        assert!(record.spec.namespace_selector.is_none());
        assert!(record.spec.pod_selector.is_some());
        assert_eq!(record.status.event_count, 4);
        assert!(!record.is_deleting());
    }

    #[test]
    fn test_enabled_defaults_to_false() {
        let yaml = r#"
metadata: { name: a, namespace: b }
spec: { webhookUrl: "https://hooks.example.com" }
"#;
        let record: SubscriptionRecord = serde_yaml::from_str(yaml).unwrap();
        assert!(!record.spec.enabled);
    }

    #[test]
    fn test_inbound_event_from_json() {
        let json = r#"{
            "name": "worker-1.17a",
            "reason": "BackOff",
            "message": "Back-off restarting failed container",
            "involvedObject": {"kind": "Pod", "name": "worker-1", "namespace": "ns"},
            "type": "Warning"
        }"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.reason, "BackOff");
        assert_eq!(event.involved_object.name, "worker-1");
        assert_eq!(event.event_type, EventType::Warning);
    }

    #[test]
    fn test_resource_snapshot_builders() {
        let pod = ResourceSnapshot::new("ns", "worker-1")
            .with_label("tier", "backend")
            .with_container("app", 3)
            .with_container("sidecar", 0);
        assert_eq!(pod.labels.get("tier").map(String::as_str), Some("backend"));
        assert_eq!(pod.containers.len(), 2);
        assert_eq!(pod.containers[0].restart_count, 3);
    }

    #[test]
    fn test_condition_constructors() {
        let ok = Condition::ready("Configured");
        assert!(ok.status);
        assert_eq!(ok.condition_type, "Ready");

        let bad = Condition::not_ready("InvalidTemplate", "too few placeholders");
        assert!(!bad.status);
        assert_eq!(bad.message, "too few placeholders");
    }
}
