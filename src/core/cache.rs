//! Shared result cache with versioned, immutable entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::subscription::{Subscription, SubscriptionHandle, SubscriptionRegistry};
use crate::util::serde::ResourceKey;

/// A published value. Entries are replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    /// Key the value belongs to.
    pub key: ResourceKey,
    /// Published value.
    pub value: V,
    /// Strictly increasing per key, including across invalidations.
    pub version: u64,
    /// When the entry was published.
    pub published_at: Instant,
    /// Age after which reads treat the entry as a miss.
    pub ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    /// Whether the entry is still within its ttl at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.ttl
            .is_none_or(|ttl| now.saturating_duration_since(self.published_at) < ttl)
    }
}

/// A publish whose subscriber callbacks have not run yet.
///
/// Lets the caller release its locks before invoking callbacks.
#[must_use = "subscribers are only notified by `deliver`"]
pub struct Fanout<V> {
    entry: Arc<CacheEntry<V>>,
    listeners: Vec<Arc<Subscription<V>>>,
}

impl<V> Fanout<V> {
    /// The newly published entry.
    pub const fn entry(&self) -> &Arc<CacheEntry<V>> {
        &self.entry
    }

    /// Number of subscribers captured at publish time.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Invoke every captured subscriber that is still active, in registration
    /// order. Returns how many ran.
    pub fn deliver(self) -> usize {
        self.listeners
            .iter()
            .filter(|listener| listener.notify(&self.entry))
            .count()
    }
}

/// Latest value per key plus the subscriptions listening to them.
pub struct SharedCache<V> {
    entries: HashMap<ResourceKey, Arc<CacheEntry<V>>>,
    versions: HashMap<ResourceKey, u64>,
    default_ttl: Option<Duration>,
    subscriptions: SubscriptionRegistry<V>,
}

impl<V> SharedCache<V> {
    /// Create an empty cache. `default_ttl` applies to every published entry.
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            versions: HashMap::new(),
            default_ttl,
            subscriptions: SubscriptionRegistry::new(),
        }
    }

    /// Fresh entry for `key`, or `None` on a miss or an expired entry.
    pub fn get(&self, key: &str, now: Instant) -> Option<Arc<CacheEntry<V>>> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .cloned()
    }

    /// Last published entry for `key`, ignoring ttl.
    pub fn peek(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.entries.get(key).cloned()
    }

    /// Publish `value` and notify subscribers before returning.
    pub fn publish(&mut self, key: &str, value: V, now: Instant) -> Arc<CacheEntry<V>> {
        let fanout = self.stage_publish(key, value, now);
        let entry = Arc::clone(fanout.entry());
        fanout.deliver();
        entry
    }

    /// Store the next version of `key` and capture its active subscribers.
    pub fn stage_publish(&mut self, key: &str, value: V, now: Instant) -> Fanout<V> {
        let version = self.versions.entry(key.to_owned()).or_insert(0);
        *version += 1;
        let entry = Arc::new(CacheEntry {
            key: key.to_owned(),
            value,
            version: *version,
            published_at: now,
            ttl: self.default_ttl,
        });
        self.entries.insert(key.to_owned(), Arc::clone(&entry));
        tracing::debug!(key, version = entry.version, "cache entry published");
        Fanout {
            entry,
            listeners: self.subscriptions.listeners(key),
        }
    }

    /// Remove the entry for `key` without notifying. Returns whether one existed.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry past its ttl. Returns the evicted keys.
    ///
    /// Version counters survive, so a later publish still gets a higher version.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<ResourceKey> {
        if self.default_ttl.is_none() {
            return Vec::new();
        }
        let mut evicted = Vec::new();
        self.entries.retain(|key, entry| {
            let fresh = entry.is_fresh(now);
            if !fresh {
                evicted.push(key.clone());
            }
            fresh
        });
        evicted
    }

    /// Register a subscriber for `key`.
    pub fn subscribe<F>(&mut self, key: &str, callback: F) -> SubscriptionHandle<V>
    where
        F: Fn(&CacheEntry<V>) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(key, callback)
    }

    /// Subscription registry.
    pub const fn subscriptions(&self) -> &SubscriptionRegistry<V> {
        &self.subscriptions
    }

    /// Mutable subscription registry.
    pub const fn subscriptions_mut(&mut self) -> &mut SubscriptionRegistry<V> {
        &mut self.subscriptions
    }

    /// Latest version issued for `key`, even if the entry was invalidated.
    pub fn version(&self, key: &str) -> Option<u64> {
        self.versions.get(key).copied()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
