//! Watch loop: consumes pod events and dispatches restart alerts
//!
//! For every event the loop:
//! 1. Drops events outside the configured [`WatchFilter`]
//! 2. Classifies the event as a restart or not
//! 3. Fetches the involved pod
//! 4. Evaluates each enabled subscription against the pod
//! 5. Sends the alert and reports the delivery
//!
//! The loop reconnects when the stream ends and only returns on
//! cancellation or after too many consecutive stream-open failures.

use crate::cluster::{
    with_deadline, EventSource, EventStream, ResourceLookup, StreamOpenError, WatchFilter,
};
use crate::config::{ReconnectConfig, WatcherConfig};
use crate::event_fields;
use crate::model::{InboundEvent, ResourceSnapshot};
use crate::notify::SlackNotifier;
use crate::status::StatusReporter;
use crate::watcher::registry::{AlertRegistry, RegistryEntry};
use crate::watcher::{is_restart_event, should_alert};
use chrono::Utc;
use futures::StreamExt;
use metrics::{counter, increment_counter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Errors that end the watch loop
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The stream could not be opened after the configured attempts
    #[error("failed to open event stream after {attempts} attempts: {source}")]
    StreamOpen {
        /// Consecutive failed attempts
        attempts: u32,
        /// Last open error
        source: StreamOpenError,
    },
}

/// Lifecycle state of the watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Not connected; waiting before the next attempt
    Disconnected,
    /// Opening the event stream
    Connecting,
    /// Consuming events
    Streaming,
    /// Cancellation observed, releasing the stream
    ShuttingDown,
    /// Loop has exited
    Terminated,
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Cancellation signal and parent span passed through the loop
#[derive(Debug, Clone)]
pub struct WatchContext {
    /// Stops the loop when cancelled
    pub token: CancellationToken,
    /// Parent span for everything the loop logs
    pub span: tracing::Span,
}

impl WatchContext {
    /// Context with a fresh token under a `watch_loop` span
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            span: tracing::info_span!("watch_loop"),
        }
    }
}

/// Exponential reconnect delay
///
/// # Examples
///
/// ```
/// use podwatch::watcher::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0, 3);
/// assert_eq!(backoff.delay(0), Duration::from_millis(100));
/// assert_eq!(backoff.delay(2), Duration::from_millis(400));
/// assert_eq!(backoff.delay(5), Duration::from_millis(500));
/// assert!(backoff.exhausted(3));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl Backoff {
    /// Backoff starting at `initial`, growing by `multiplier` up to `max`
    ///
    /// `max_attempts` of zero never gives up.
    pub fn new(initial: Duration, max: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            multiplier: multiplier.max(1.0),
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let max = self.max.as_millis() as f64;
        if !millis.is_finite() || millis >= max {
            self.max
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Whether `failures` consecutive failures exhaust the policy
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts > 0 && failures >= self.max_attempts
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.multiplier,
            config.max_attempts,
        )
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

enum StreamEnd {
    Closed { received: usize },
    Cancelled,
}

/// The watch loop and its collaborators
pub struct Watcher {
    source: Arc<dyn EventSource>,
    lookup: Arc<dyn ResourceLookup>,
    registry: Arc<AlertRegistry>,
    status: Arc<dyn StatusReporter>,
    filter: WatchFilter,
    lookup_timeout: Duration,
    backoff: Backoff,
    state: watch::Sender<WatchState>,
}

impl Watcher {
    /// Create a watcher from configuration and collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - Filter, lookup deadline and reconnect policy
    /// * `source` - Event stream supplier
    /// * `lookup` - Pod and namespace metadata supplier
    /// * `registry` - Subscriptions to evaluate
    /// * `status` - Delivery status sink
    pub fn new(
        config: &WatcherConfig,
        source: Arc<dyn EventSource>,
        lookup: Arc<dyn ResourceLookup>,
        registry: Arc<AlertRegistry>,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        let (state, _) = watch::channel(WatchState::Disconnected);
        Self {
            source,
            lookup,
            registry,
            status,
            filter: config.filter(),
            lookup_timeout: config.lookup_timeout(),
            backoff: Backoff::from(&config.reconnect),
            state,
        }
    }

    /// Receiver observing state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Current state
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    fn set_state(&self, state: WatchState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Watch state changed");
        }
    }

    /// Run until cancelled
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::StreamOpen`] once the reconnect policy is
    /// exhausted.
    pub async fn run(&self, ctx: WatchContext) -> Result<(), WatcherError> {
        let span = ctx.span.clone();
        let result = self.run_loop(&ctx).instrument(span).await;
        self.set_state(WatchState::Terminated);
        result
    }

    async fn run_loop(&self, ctx: &WatchContext) -> Result<(), WatcherError> {
        info!(filter = %self.filter.field_selector(), "Starting watch loop");

        let mut failures: u32 = 0;
        let mut idle_closes: u32 = 0;

        loop {
            if ctx.token.is_cancelled() {
                break;
            }

            self.set_state(WatchState::Connecting);
            let opened = tokio::select! {
                biased;
                _ = ctx.token.cancelled() => break,
                opened = self.source.open(&self.filter) => opened,
            };

            let stream = match opened {
                Ok(stream) => {
                    failures = 0;
                    stream
                }
                Err(e) => {
                    failures += 1;
                    if self.backoff.exhausted(failures) {
                        error!(attempts = failures, error = %e, "Giving up on event stream");
                        return Err(WatcherError::StreamOpen {
                            attempts: failures,
                            source: e,
                        });
                    }

                    let delay = self.backoff.delay(failures - 1);
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Failed to open event stream, retrying"
                    );
                    self.set_state(WatchState::Disconnected);
                    if !sleep_or_cancel(&ctx.token, delay).await {
                        break;
                    }
                    continue;
                }
            };

            self.set_state(WatchState::Streaming);
            info!("Event stream opened");

            match self.consume(stream, ctx).await {
                StreamEnd::Cancelled => break,
                StreamEnd::Closed { received } => {
                    increment_counter!("podwatch_stream_reconnects_total");
                    if received > 0 {
                        idle_closes = 0;
                        info!(received, "Event stream closed, reconnecting");
                        continue;
                    }

                    let delay = self.backoff.delay(idle_closes);
                    idle_closes = idle_closes.saturating_add(1);
                    info!(
                        delay_ms = delay.as_millis() as u64,
                        "Event stream closed without events, reconnecting after delay"
                    );
                    self.set_state(WatchState::Disconnected);
                    if !sleep_or_cancel(&ctx.token, delay).await {
                        break;
                    }
                }
            }
        }

        self.set_state(WatchState::ShuttingDown);
        info!("Watch loop cancelled");
        Ok(())
    }

    async fn consume(&self, mut stream: EventStream, ctx: &WatchContext) -> StreamEnd {
        let mut received = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.token.cancelled() => {
                    self.set_state(WatchState::ShuttingDown);
                    return StreamEnd::Cancelled;
                }
                next = stream.next() => next,
            };

            let Some(event) = next else {
                return StreamEnd::Closed { received };
            };

            received += 1;
            let span = event_fields!(event);
            self.handle_event(event, ctx).instrument(span).await;
        }
    }

    /// Process a single event
    ///
    /// Errors are logged and contained; nothing here ends the loop.
    pub async fn handle_event(&self, event: InboundEvent, ctx: &WatchContext) {
        increment_counter!("podwatch_events_received_total");

        if !self.filter.matches(&event) {
            debug!("Event outside watch filter, ignoring");
            return;
        }

        if !is_restart_event(&event) {
            debug!("Not a restart event, ignoring");
            return;
        }
        increment_counter!("podwatch_restart_events_total");

        let pod = match self.fetch_pod(&event).await {
            Some(pod) => pod,
            None => return,
        };

        for entry in self.registry.snapshot() {
            if ctx.token.is_cancelled() {
                debug!("Cancelled, skipping remaining subscriptions");
                break;
            }

            if !entry.record.spec.enabled {
                continue;
            }
            let Some(notifier) = entry.notifier.as_deref() else {
                continue;
            };

            if !should_alert(&entry.record, &pod, self.lookup.as_ref(), self.lookup_timeout).await
            {
                debug!(subscription = %entry.key, "Subscription does not match pod");
                continue;
            }

            self.deliver(&entry, notifier, &pod, &event).await;
        }
    }

    async fn fetch_pod(&self, event: &InboundEvent) -> Option<ResourceSnapshot> {
        let reference = &event.involved_object;
        let lookup = self.lookup.get_pod(&reference.namespace, &reference.name);

        match with_deadline(self.lookup_timeout, lookup).await {
            Ok(pod) => Some(pod),
            Err(e) => {
                warn!(error = %e, "Failed to fetch pod, skipping event");
                None
            }
        }
    }

    async fn deliver(
        &self,
        entry: &RegistryEntry,
        notifier: &SlackNotifier,
        pod: &ResourceSnapshot,
        event: &InboundEvent,
    ) {
        let spec = &entry.record.spec;
        let sent = notifier
            .send(pod, event, &spec.channel, &spec.username, &spec.message_template)
            .await;

        if let Err(e) = sent {
            counter!("podwatch_deliveries_total", 1, "status" => "failure");
            error!(
                subscription = %entry.key,
                pod = %pod.name,
                namespace = %pod.namespace,
                reason = %event.reason,
                kind = e.kind(),
                error = %e,
                "Failed to deliver alert"
            );
            return;
        }

        counter!("podwatch_deliveries_total", 1, "status" => "success");
        let now = Utc::now();
        let count = self
            .registry
            .record_delivery(&entry.key, now)
            .unwrap_or_else(|| entry.record.status.event_count.saturating_add(1));

        info!(subscription = %entry.key, event_count = count, "Alert delivered");

        let report = self.status.record_delivery(&entry.key, now, count);
        match tokio::time::timeout(self.lookup_timeout, report).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(subscription = %entry.key, error = %e, "Failed to report delivery status");
            }
            Err(_) => {
                warn!(subscription = %entry.key, "Delivery status report timed out");
            }
        }
    }
}

/// Sleep for `delay`; returns false if cancelled first
async fn sleep_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
