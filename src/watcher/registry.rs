//! In-memory alert registry
//!
//! Maps subscription keys to their record and, for enabled records, the
//! notifier built from the record's webhook URL. Writers replace the whole
//! map (copy-on-write), so a snapshot taken by the watcher is never mutated
//! while it is being iterated.

use crate::model::{SubscriptionKey, SubscriptionRecord};
use crate::notify::SlackNotifier;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// One registry entry as seen by a snapshot
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Subscription key
    pub key: SubscriptionKey,
    /// Record at snapshot time
    pub record: Arc<SubscriptionRecord>,
    /// Notifier, present exactly when the record is enabled
    pub notifier: Option<Arc<SlackNotifier>>,
}

#[derive(Debug, Clone)]
struct Entry {
    record: Arc<SubscriptionRecord>,
    notifier: Option<Arc<SlackNotifier>>,
}

/// Concurrency-safe subscription registry
///
/// # Examples
///
/// ```
/// use podwatch::model::SubscriptionRecord;
/// use podwatch::watcher::AlertRegistry;
/// use std::time::Duration;
///
/// let registry = AlertRegistry::new(Duration::from_secs(30));
/// registry.upsert(SubscriptionRecord::new("ns", "app-alerts", "https://hooks.example.com/T0"));
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.len(), 1);
/// assert!(snapshot[0].notifier.is_some());
/// ```
#[derive(Debug)]
pub struct AlertRegistry {
    entries: RwLock<Arc<HashMap<SubscriptionKey, Entry>>>,
    notifier_timeout: Duration,
}

impl AlertRegistry {
    /// Empty registry; notifiers are built with `notifier_timeout`
    pub fn new(notifier_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(Arc::new(HashMap::new())),
            notifier_timeout,
        }
    }

    /// Insert or replace the record at its key
    ///
    /// An enabled record gets a fresh notifier for its current webhook URL;
    /// a disabled record loses any notifier it had.
    pub fn upsert(&self, record: SubscriptionRecord) {
        let key = record.key();
        let notifier = record.spec.enabled.then(|| {
            Arc::new(SlackNotifier::new(
                &record.spec.webhook_url,
                self.notifier_timeout,
            ))
        });

        debug!(
            subscription = %key,
            enabled = record.spec.enabled,
            "Upserting subscription"
        );

        let mut entries = self.write();
        Arc::make_mut(&mut *entries).insert(
            key,
            Entry {
                record: Arc::new(record),
                notifier,
            },
        );
    }

    /// Remove the record at `key`; absent keys are ignored
    pub fn remove(&self, key: &SubscriptionKey) {
        let mut entries = self.write();
        if entries.contains_key(key) {
            Arc::make_mut(&mut *entries).remove(key);
            debug!(subscription = %key, "Removed subscription");
        }
    }

    /// Point-in-time copy of all entries, ordered by key
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        let entries = Arc::clone(&*self.read());

        let mut snapshot: Vec<RegistryEntry> = entries
            .iter()
            .map(|(key, entry)| RegistryEntry {
                key: key.clone(),
                record: Arc::clone(&entry.record),
                notifier: entry.notifier.clone(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }

    /// Current record at `key`
    pub fn get(&self, key: &SubscriptionKey) -> Option<Arc<SubscriptionRecord>> {
        self.read().get(key).map(|e| Arc::clone(&e.record))
    }

    /// Advance the mirrored delivery status of `key`
    ///
    /// Returns the new cumulative count, or `None` if the key was removed
    /// in the meantime.
    pub fn record_delivery(&self, key: &SubscriptionKey, at: DateTime<Utc>) -> Option<u32> {
        let mut entries = self.write();
        let entry = Arc::make_mut(&mut *entries).get_mut(key)?;

        let record = Arc::make_mut(&mut entry.record);
        record.status.last_event_time = Some(at);
        record.status.event_count = record.status.event_count.saturating_add(1);
        Some(record.status.event_count)
    }

    /// Number of registered subscriptions
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Writers replace whole maps; a poisoned guard still holds a complete map.
    fn read(&self) -> RwLockReadGuard<'_, Arc<HashMap<SubscriptionKey, Entry>>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<HashMap<SubscriptionKey, Entry>>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Registry lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

impl Default for AlertRegistry {
    fn default() -> Self {
        Self::new(crate::notify::DEFAULT_TIMEOUT)
    }
}
