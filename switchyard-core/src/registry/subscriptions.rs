//! Subscription storage keyed by webhook

use crate::document::Subscription;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Decides whether a stored subscription is still live
///
/// Consulted whenever subscriptions are listed; rejected entries are pruned.
pub trait RetentionPolicy: Send + Sync + fmt::Debug {
    /// `age` is the time since this entry was last upserted
    fn retains(&self, subscription: &Subscription, age: Duration) -> bool;
}

/// Subscriptions live until process exit or explicit removal
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepForever;

impl RetentionPolicy for KeepForever {
    fn retains(&self, _subscription: &Subscription, _age: Duration) -> bool {
        true
    }
}

/// Subscriptions expire unless renewed within the given age
#[derive(Debug, Clone, Copy)]
pub struct MaxAge(pub Duration);

impl RetentionPolicy for MaxAge {
    fn retains(&self, _subscription: &Subscription, age: Duration) -> bool {
        age <= self.0
    }
}

struct Entry {
    subscription: Subscription,
    registered: Instant,
}

/// Map from webhook URL to the subscription that registered it
///
/// At most one subscription per webhook; an upsert for a known webhook
/// replaces the previous subscription wholesale.
pub struct SubscriptionRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
    retention: Box<dyn RetentionPolicy>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("len", &self.entries.read().len())
            .field("retention", &self.retention)
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Create a registry that keeps subscriptions forever
    pub fn new() -> Self {
        Self::with_retention(KeepForever)
    }

    /// Create a registry with a custom retention policy
    pub fn with_retention(policy: impl RetentionPolicy + 'static) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            retention: Box::new(policy),
        }
    }

    /// Insert or replace the subscription for its webhook
    ///
    /// Returns the subscription it replaced, if any.
    pub fn upsert(&self, subscription: Subscription) -> Option<Subscription> {
        let webhook = subscription.webhook().to_string();
        let entry = Entry {
            subscription,
            registered: Instant::now(),
        };
        self.entries
            .write()
            .insert(webhook, entry)
            .map(|previous| previous.subscription)
    }

    /// Current subscription for a webhook
    pub fn get(&self, webhook: &str) -> Option<Subscription> {
        self.entries
            .read()
            .get(webhook)
            .map(|entry| entry.subscription.clone())
    }

    /// Drop the subscription for a webhook
    pub fn remove(&self, webhook: &str) -> Option<Subscription> {
        self.entries
            .write()
            .remove(webhook)
            .map(|entry| entry.subscription)
    }

    /// All live subscriptions, keyed by webhook
    pub fn snapshot(&self) -> BTreeMap<String, Subscription> {
        self.prune();
        self.entries
            .read()
            .iter()
            .map(|(webhook, entry)| (webhook.clone(), entry.subscription.clone()))
            .collect()
    }

    /// Live subscriptions to one schema type, ordered by webhook
    pub fn for_schema_type(&self, schema_type: &str) -> Vec<Subscription> {
        self.prune();
        self.entries
            .read()
            .values()
            .filter(|entry| entry.subscription.schema_type() == schema_type)
            .map(|entry| entry.subscription.clone())
            .collect()
    }

    /// Remove entries the retention policy rejects; returns how many
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|webhook, entry| {
            let keep = self
                .retention
                .retains(&entry.subscription, now.duration_since(entry.registered));
            if !keep {
                debug!(%webhook, "subscription expired");
            }
            keep
        });
        before - entries.len()
    }

    /// Number of stored subscriptions
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
