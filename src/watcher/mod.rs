//! Restart watcher
//!
//! Watches pod warning events, decides which ones denote a restart, and
//! notifies every subscription whose selectors match the pod.
//!
//! # Overview
//!
//! 1. The controller keeps the [`AlertRegistry`] current
//! 2. The [`Watcher`] consumes the event stream and reconnects as needed
//! 3. [`is_restart_event`] classifies each event
//! 4. [`should_alert`] evaluates subscription selectors against the pod
//! 5. The subscription's notifier delivers the alert
//!
//! # Modules
//!
//! - [`classifier`]: restart classification
//! - [`logging`]: structured logging configuration
//! - [`matcher`]: namespace and pod selector evaluation
//! - [`registry`]: copy-on-write subscription registry
//! - [`watcher`]: the watch loop itself

pub mod classifier;
pub mod logging;
pub mod matcher;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod watcher;

pub use classifier::is_restart_event;
pub use matcher::should_alert;
pub use registry::{AlertRegistry, RegistryEntry};
pub use watcher::{Backoff, WatchContext, WatchState, Watcher, WatcherError};
