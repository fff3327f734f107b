//! Subscription registry for cache update fan-out.
//!
//! Subscriptions are deactivated rather than removed on unsubscribe. A fan-out
//! in progress holds its own references, so a deactivated subscription is only
//! dropped from the registry once no fan-out still refers to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::core::cache::CacheEntry;
use crate::util::serde::{ResourceKey, SubscriptionId};

type Callback<V> = Box<dyn Fn(&CacheEntry<V>) + Send + Sync>;

/// A registered listener for one key.
pub struct Subscription<V> {
    id: SubscriptionId,
    key: ResourceKey,
    callback: Callback<V>,
    active: AtomicBool,
    delivered: AtomicU64,
}

impl<V> Subscription<V> {
    /// Subscription identifier.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Key this subscription listens to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the subscription still receives updates.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Invoke the callback if still active and `entry` is newer than the last
    /// version delivered. Returns whether it ran.
    ///
    /// Fan-outs run outside the scheduler lock, so two publishes of one key
    /// may race here; the older one is dropped.
    pub fn notify(&self, entry: &CacheEntry<V>) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.delivered.fetch_max(entry.version, Ordering::AcqRel) >= entry.version {
            return false;
        }
        (self.callback)(entry);
        true
    }

    /// Highest version delivered so far, `0` before the first.
    pub fn delivered_version(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

/// Token returned by `subscribe`; unsubscribing through it is idempotent and
/// safe at any time.
pub struct SubscriptionHandle<V> {
    id: SubscriptionId,
    key: ResourceKey,
    subscription: Weak<Subscription<V>>,
}

impl<V> SubscriptionHandle<V> {
    /// Subscription identifier.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Key this handle listens to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop future notifications. Returns `true` only on the first call.
    pub fn unsubscribe(&self) -> bool {
        self.subscription
            .upgrade()
            .is_some_and(|subscription| subscription.deactivate())
    }

    /// Whether the subscription is still active.
    pub fn is_active(&self) -> bool {
        self.subscription
            .upgrade()
            .is_some_and(|subscription| subscription.is_active())
    }
}

impl<V> Clone for SubscriptionHandle<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            key: self.key.clone(),
            subscription: Weak::clone(&self.subscription),
        }
    }
}

/// Subscriptions grouped by key.
pub struct SubscriptionRegistry<V> {
    by_key: HashMap<ResourceKey, Vec<Arc<Subscription<V>>>>,
    last_id: SubscriptionId,
}

impl<V> SubscriptionRegistry<V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            last_id: 0,
        }
    }

    /// Register `callback` for every future publish of `key`.
    pub fn subscribe<F>(&mut self, key: &str, callback: F) -> SubscriptionHandle<V>
    where
        F: Fn(&CacheEntry<V>) + Send + Sync + 'static,
    {
        self.last_id += 1;
        let subscription = Arc::new(Subscription {
            id: self.last_id,
            key: key.to_owned(),
            callback: Box::new(callback),
            active: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
        });
        let handle = SubscriptionHandle {
            id: subscription.id,
            key: key.to_owned(),
            subscription: Arc::downgrade(&subscription),
        };
        self.by_key
            .entry(key.to_owned())
            .or_default()
            .push(subscription);
        handle
    }

    /// Deactivate a subscription by id. Returns `true` if it was active.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.by_key
            .values()
            .flatten()
            .find(|subscription| subscription.id == id)
            .is_some_and(|subscription| subscription.deactivate())
    }

    /// Active subscriptions for `key`, in registration order.
    ///
    /// Collects garbage for the key first.
    pub fn listeners(&mut self, key: &str) -> Vec<Arc<Subscription<V>>> {
        let Some(subscriptions) = self.by_key.get_mut(key) else {
            return Vec::new();
        };
        subscriptions.retain(|s| s.is_active() || Arc::strong_count(s) > 1);
        let listeners: Vec<_> = subscriptions
            .iter()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        if subscriptions.is_empty() {
            self.by_key.remove(key);
        }
        listeners
    }

    /// Drop inactive subscriptions no fan-out still references. Returns how
    /// many were removed.
    pub fn collect_garbage(&mut self) -> usize {
        let mut removed = 0;
        self.by_key.retain(|_, subscriptions| {
            let before = subscriptions.len();
            subscriptions.retain(|s| s.is_active() || Arc::strong_count(s) > 1);
            removed += before - subscriptions.len();
            !subscriptions.is_empty()
        });
        removed
    }

    /// Number of active subscriptions for `key`.
    pub fn active_count(&self, key: &str) -> usize {
        self.by_key
            .get(key)
            .map_or(0, |subs| subs.iter().filter(|s| s.is_active()).count())
    }

    /// Number of subscriptions held, active or not.
    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    /// Whether no subscription is held.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl<V> Default for SubscriptionRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}
