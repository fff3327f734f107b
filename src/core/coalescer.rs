//! Deduplication of concurrent requests addressed to the same key.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::core::error::SchedulerError;
use crate::util::serde::ResourceKey;

/// Final outcome delivered to every waiter of a key.
pub type Outcome<V> = Result<V, SchedulerError>;

/// Receiving half handed to a caller of [`RequestCoalescer::acquire`].
pub type OutcomeReceiver<V> = oneshot::Receiver<Outcome<V>>;

/// Outstanding work for one key and everyone waiting on it.
pub struct PendingRequest<P, V> {
    /// Key this request resolves.
    pub key: ResourceKey,
    /// Payload supplied by the first caller.
    pub payload: P,
    /// When the request was first registered.
    pub enqueued_at: Instant,
    waiters: Vec<oneshot::Sender<Outcome<V>>>,
    /// Callers that arrived after a refresh of the dispatched cycle.
    next_waiters: Vec<oneshot::Sender<Outcome<V>>>,
    dispatched: bool,
    refresh_after: bool,
}

impl<P, V> PendingRequest<P, V> {
    fn new(key: &str, payload: P, now: Instant, waiters: Vec<oneshot::Sender<Outcome<V>>>) -> Self {
        Self {
            key: key.to_owned(),
            payload,
            enqueued_at: now,
            waiters,
            next_waiters: Vec::new(),
            dispatched: false,
            refresh_after: false,
        }
    }

    /// Number of callers awaiting this key, including those held for a
    /// follow-up cycle.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len() + self.next_waiters.len()
    }

    /// Whether the key is part of a batch already handed to the service.
    pub const fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    /// Whether a new cycle starts once the dispatched one resolves.
    pub const fn refresh_requested(&self) -> bool {
        self.refresh_after
    }
}

/// Registry of in-flight keys.
///
/// Each key has at most one [`PendingRequest`]; callers arriving while it is
/// queued, admitted or already dispatched attach to it and receive the same
/// outcome. The exception is a dispatched key marked for refresh: callers
/// arriving after the mark wait for the follow-up cycle instead.
pub struct RequestCoalescer<P, V> {
    pending: HashMap<ResourceKey, PendingRequest<P, V>>,
}

impl<P, V> RequestCoalescer<P, V> {
    /// Create an empty coalescer.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Attach a waiter for `key`, creating the pending request if needed.
    ///
    /// Returns the waiter's receiver and whether the caller became the owner
    /// that must schedule the dispatch. When the key is already pending the
    /// supplied payload is dropped in favor of the owner's.
    pub fn acquire(
        &mut self,
        key: &str,
        payload: P,
        now: Instant,
    ) -> (OutcomeReceiver<V>, bool) {
        let (tx, rx) = oneshot::channel();
        if let Some(pending) = self.pending.get_mut(key) {
            if pending.refresh_after {
                pending.next_waiters.push(tx);
            } else {
                pending.waiters.push(tx);
            }
            return (rx, false);
        }
        self.pending
            .insert(key.to_owned(), PendingRequest::new(key, payload, now, vec![tx]));
        (rx, true)
    }

    /// Create a pending request with no waiters. Returns `false` if the key is
    /// already pending.
    pub fn register(&mut self, key: &str, payload: P, now: Instant) -> bool {
        if self.pending.contains_key(key) {
            return false;
        }
        self.pending
            .insert(key.to_owned(), PendingRequest::new(key, payload, now, Vec::new()));
        true
    }

    /// Record that `key` was handed to the service.
    pub fn mark_dispatched(&mut self, key: &str) {
        if let Some(pending) = self.pending.get_mut(key) {
            pending.dispatched = true;
        }
    }

    /// Record that `key` is back in the pending pool awaiting a retry.
    ///
    /// The retried call starts after any refresh, so callers held for a
    /// follow-up cycle join the current one.
    pub fn mark_queued(&mut self, key: &str) {
        if let Some(pending) = self.pending.get_mut(key) {
            pending.dispatched = false;
            pending.refresh_after = false;
            let next = std::mem::take(&mut pending.next_waiters);
            pending.waiters.extend(next);
        }
    }

    /// Ask for a follow-up cycle once the dispatched cycle of `key` resolves.
    ///
    /// Returns `false` when the key is not pending or not yet dispatched; a
    /// queued cycle already serves as the refresh.
    pub fn defer_refresh(&mut self, key: &str) -> bool {
        match self.pending.get_mut(key) {
            Some(pending) if pending.dispatched => {
                pending.refresh_after = true;
                true
            }
            _ => false,
        }
    }

    /// Whether `key` has outstanding work.
    pub fn contains(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Pending request for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&PendingRequest<P, V>> {
        self.pending.get(key)
    }

    /// Number of waiters attached to `key`.
    pub fn waiter_count(&self, key: &str) -> usize {
        self.pending.get(key).map_or(0, PendingRequest::waiter_count)
    }

    /// Number of pending keys.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no key is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn deliver<V: Clone>(waiters: Vec<oneshot::Sender<Outcome<V>>>, outcome: &Outcome<V>) -> usize {
    waiters
        .into_iter()
        .map(|waiter| waiter.send(outcome.clone()))
        .filter(Result::is_ok)
        .count()
}

impl<P, V: Clone> RequestCoalescer<P, V> {
    /// Deliver `outcome` to every waiter of `key`, in attachment order, and
    /// forget the key. Returns how many waiters were still listening.
    pub fn resolve(&mut self, key: &str, outcome: Outcome<V>) -> usize {
        let Some(pending) = self.pending.remove(key) else {
            return 0;
        };
        deliver(pending.waiters, &outcome) + deliver(pending.next_waiters, &outcome)
    }

    /// Finish the dispatched cycle of `key` with `outcome`.
    ///
    /// Without a pending refresh this is [`resolve`](Self::resolve). With one,
    /// only the callers of the finished cycle receive `outcome`; the key stays
    /// pending with the later callers and the returned payload must be
    /// enqueued for the follow-up cycle.
    pub fn complete(&mut self, key: &str, outcome: Outcome<V>, now: Instant) -> Option<P>
    where
        P: Clone,
    {
        let pending = self.pending.get_mut(key)?;
        if !pending.refresh_after {
            self.resolve(key, outcome);
            return None;
        }
        let waiters = std::mem::take(&mut pending.waiters);
        pending.waiters = std::mem::take(&mut pending.next_waiters);
        pending.refresh_after = false;
        pending.dispatched = false;
        pending.enqueued_at = now;
        let payload = pending.payload.clone();
        deliver(waiters, &outcome);
        Some(payload)
    }

    /// Resolve every pending key with `error`. Returns the number of keys failed.
    pub fn fail_all(&mut self, error: &SchedulerError) -> usize {
        let keys: Vec<ResourceKey> = self.pending.keys().cloned().collect();
        for key in &keys {
            self.resolve(key, Err(error.clone()));
        }
        keys.len()
    }
}

impl<P, V> Default for RequestCoalescer<P, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_caller_owns_the_key() {
        let mut coalescer = RequestCoalescer::<u32, String>::new();
        let now = Instant::now();
        let (_rx1, owner1) = coalescer.acquire("job-42", 1, now);
        let (_rx2, owner2) = coalescer.acquire("job-42", 2, now);
        let (_rx3, owner3) = coalescer.acquire("job-7", 3, now);

        assert!(owner1);
        assert!(!owner2);
        assert!(owner3);
        assert_eq!(coalescer.len(), 2);
        assert_eq!(coalescer.waiter_count("job-42"), 2);
        assert_eq!(coalescer.get("job-42").map(|p| p.payload), Some(1));
    }

    #[test]
    fn resolve_reaches_every_waiter_once() {
        let mut coalescer = RequestCoalescer::<(), String>::new();
        let now = Instant::now();
        let mut receivers: Vec<_> = (0..5)
            .map(|_| coalescer.acquire("job-42", (), now).0)
            .collect();

        assert_eq!(coalescer.resolve("job-42", Ok("42".to_string())), 5);
        assert!(coalescer.is_empty());
        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), Ok("42".to_string()));
        }
        assert_eq!(coalescer.resolve("job-42", Ok("again".to_string())), 0);
    }

    #[test]
    fn dropped_waiters_do_not_block_others() {
        let mut coalescer = RequestCoalescer::<(), u8>::new();
        let now = Instant::now();
        let (rx1, _) = coalescer.acquire("k", (), now);
        let (mut rx2, _) = coalescer.acquire("k", (), now);
        drop(rx1);

        assert_eq!(coalescer.resolve("k", Ok(7)), 1);
        assert_eq!(rx2.try_recv().unwrap(), Ok(7));
    }

    #[test]
    fn register_creates_owner_without_waiters() {
        let mut coalescer = RequestCoalescer::<u8, u8>::new();
        let now = Instant::now();
        assert!(coalescer.register("k", 1, now));
        assert!(!coalescer.register("k", 2, now));
        assert_eq!(coalescer.waiter_count("k"), 0);

        let (mut rx, owner) = coalescer.acquire("k", 3, now);
        assert!(!owner);
        coalescer.resolve("k", Ok(9));
        assert_eq!(rx.try_recv().unwrap(), Ok(9));
    }

    #[test]
    fn fail_all_drains_everything() {
        let mut coalescer = RequestCoalescer::<(), u8>::new();
        let now = Instant::now();
        let (mut a, _) = coalescer.acquire("a", (), now);
        let (mut b, _) = coalescer.acquire("b", (), now);

        assert_eq!(coalescer.fail_all(&SchedulerError::Shutdown), 2);
        assert_eq!(a.try_recv().unwrap(), Err(SchedulerError::Shutdown));
        assert_eq!(b.try_recv().unwrap(), Err(SchedulerError::Shutdown));
        assert!(coalescer.is_empty());
    }

    #[test]
    fn refresh_is_deferred_only_once_dispatched() {
        let mut coalescer = RequestCoalescer::<u8, u8>::new();
        let now = Instant::now();
        let (mut before, _) = coalescer.acquire("k", 1, now);
        assert!(!coalescer.defer_refresh("k"));
        assert!(!coalescer.defer_refresh("missing"));

        coalescer.mark_dispatched("k");
        assert!(coalescer.defer_refresh("k"));
        let (mut after, owner) = coalescer.acquire("k", 2, now);
        assert!(!owner);
        assert_eq!(coalescer.waiter_count("k"), 2);

        // The dispatched cycle answers only the callers that preceded the refresh.
        assert_eq!(coalescer.complete("k", Ok(1), now), Some(1));
        assert_eq!(before.try_recv().unwrap(), Ok(1));
        assert!(after.try_recv().is_err());
        let pending = coalescer.get("k").unwrap();
        assert!(!pending.is_dispatched());
        assert!(!pending.refresh_requested());

        assert_eq!(coalescer.complete("k", Ok(2), now), None);
        assert_eq!(after.try_recv().unwrap(), Ok(2));
        assert!(coalescer.is_empty());
    }

    #[test]
    fn retry_merges_callers_held_for_refresh() {
        let mut coalescer = RequestCoalescer::<(), u8>::new();
        let now = Instant::now();
        let (mut first, _) = coalescer.acquire("k", (), now);
        coalescer.mark_dispatched("k");
        coalescer.defer_refresh("k");
        let (mut second, _) = coalescer.acquire("k", (), now);

        coalescer.mark_queued("k");
        assert!(!coalescer.get("k").unwrap().refresh_requested());
        assert_eq!(coalescer.complete("k", Ok(5), now), None);
        assert_eq!(first.try_recv().unwrap(), Ok(5));
        assert_eq!(second.try_recv().unwrap(), Ok(5));
    }
}
