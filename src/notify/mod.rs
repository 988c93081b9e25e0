//! Slack-compatible webhook notifications
//!
//! This module builds restart alerts and posts them to an incoming-webhook
//! endpoint. A [`SlackNotifier`] is the per-subscription notifier handle:
//! it owns the resolved webhook URL and a reusable HTTP client with a
//! bounded request timeout.
//!
//! Delivery is fire-and-forget. No retry happens here; a failed send is
//! reported as a [`DeliveryError`] and the caller decides what to do.
//!
//! # Modules
//!
//! - [`template`]: custom text templates over pod name, namespace, reason
//!   and message

pub mod template;

use crate::model::{InboundEvent, ResourceSnapshot};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use template::{MessageTemplate, TemplateError};

/// Default request timeout for webhook deliveries
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Event reason rendered with the critical color
const CRITICAL_REASON: &str = "Failed";

/// Errors that can occur while delivering a notification
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The subscription's message template is malformed
    #[error("invalid message template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    /// The request could not be sent or timed out
    #[error("webhook transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The webhook answered with a non-2xx status
    #[error("webhook returned non-success status: {0}")]
    NonSuccessStatus(u16),

    /// The message could not be serialized
    #[error("failed to encode message: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Short label for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTemplate(_) => "invalid_template",
            Self::Transport(_) => "transport",
            Self::NonSuccessStatus(_) => "non_success_status",
            Self::Encoding(_) => "encoding",
        }
    }
}

/// Outbound webhook payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackMessage {
    /// Channel override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    /// Username override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Plain text body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Structured panels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Colored message panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Side bar color
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    /// Panel title
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Panel body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Key/value fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    /// Unix timestamp in seconds
    #[serde(rename = "ts", default, skip_serializing_if = "is_zero")]
    pub timestamp: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Attachment field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field label
    pub title: String,
    /// Field value
    pub value: String,
    /// Render at half width
    pub short: bool,
}

impl Field {
    fn new(title: impl Into<String>, value: impl Into<String>, short: bool) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short,
        }
    }
}

/// Panel color of the default layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Restart caused by a failure
    Critical,
    /// Any other restart signal
    Warning,
}

impl Severity {
    /// Severity for an event reason
    pub fn for_reason(reason: &str) -> Self {
        if reason == CRITICAL_REASON {
            Self::Critical
        } else {
            Self::Warning
        }
    }

    /// Color name understood by the chat receiver
    pub fn color(&self) -> &'static str {
        match self {
            Self::Critical => "danger",
            Self::Warning => "warning",
        }
    }
}

/// Build the message for a pod/event pair
///
/// A non-empty `template` produces a plain-text message; otherwise the
/// default attachment layout is used. Channel and username overrides are
/// applied only when non-empty.
///
/// # Errors
///
/// Returns [`DeliveryError::InvalidTemplate`] if `template` does not parse.
pub fn build_message(
    pod: &ResourceSnapshot,
    event: &InboundEvent,
    channel: &str,
    username: &str,
    template: &str,
) -> Result<SlackMessage, DeliveryError> {
    let mut message = if template.is_empty() {
        default_message(pod, event, chrono::Utc::now().timestamp())
    } else {
        let template = MessageTemplate::parse(template)?;
        SlackMessage {
            text: template.render([
                pod.name.as_str(),
                pod.namespace.as_str(),
                event.reason.as_str(),
                event.message.as_str(),
            ]),
            ..Default::default()
        }
    };

    if !channel.is_empty() {
        message.channel = channel.to_string();
    }
    if !username.is_empty() {
        message.username = username.to_string();
    }

    Ok(message)
}

/// Default restart alert layout
fn default_message(pod: &ResourceSnapshot, event: &InboundEvent, timestamp: i64) -> SlackMessage {
    let mut fields = vec![
        Field::new("Namespace", &pod.namespace, true),
        Field::new("Pod Name", &pod.name, true),
        Field::new("Reason", &event.reason, true),
        Field::new("Message", &event.message, false),
    ];
    fields.extend(pod.containers.iter().map(|c| {
        Field::new(
            format!("Container: {}", c.name),
            format!("Restart Count: {}", c.restart_count),
            true,
        )
    }));

    SlackMessage {
        attachments: vec![Attachment {
            color: Severity::for_reason(&event.reason).color().to_string(),
            title: format!("Pod Restart Alert: {}", pod.name),
            text: format!(
                "Pod `{}` in namespace `{}` has restarted",
                pod.name, pod.namespace
            ),
            fields,
            timestamp,
        }],
        ..Default::default()
    }
}

/// Notifier handle for one subscription
///
/// # Examples
///
/// ```
/// use podwatch::notify::SlackNotifier;
/// use std::time::Duration;
///
/// let notifier = SlackNotifier::new("https://hooks.example.com/T0", Duration::from_secs(30));
/// assert_eq!(notifier.webhook_url(), "https://hooks.example.com/T0");
/// ```
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    webhook_url: String,
    timeout: Duration,
    client: Client,
}

impl SlackNotifier {
    /// Create a notifier for `webhook_url`
    ///
    /// The timeout is applied both to the client and to every request, so
    /// it holds even if the client falls back to default settings.
    pub fn new(webhook_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build webhook client, using defaults");
                Client::new()
            });

        Self {
            webhook_url: webhook_url.to_string(),
            timeout,
            client,
        }
    }

    /// Resolved webhook endpoint
    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Send a restart alert for `pod`
    ///
    /// # Arguments
    ///
    /// * `pod` - Pod the event is about
    /// * `event` - The restart event
    /// * `channel` - Channel override, ignored when empty
    /// * `username` - Username override, ignored when empty
    /// * `template` - Custom text template, default layout when empty
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] on template, encoding, transport or
    /// status failures. Nothing is retried.
    pub async fn send(
        &self,
        pod: &ResourceSnapshot,
        event: &InboundEvent,
        channel: &str,
        username: &str,
        template: &str,
    ) -> Result<(), DeliveryError> {
        let message = build_message(pod, event, channel, username, template)?;
        self.post(&message).await
    }

    /// Post a prepared message
    pub async fn post(&self, message: &SlackMessage) -> Result<(), DeliveryError> {
        let payload = serde_json::to_vec(message)?;

        let response = self
            .client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::NonSuccessStatus(status.as_u16()));
        }

        debug!(status = status.as_u16(), "Webhook accepted message");
        Ok(())
    }
}
