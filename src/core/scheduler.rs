//! Orchestrator composing quota admission, request coalescing, batch
//! formation, retries and cache fan-out.
//!
//! All decisions that touch shared state (admission, pending-pool mutation,
//! batch formation, coalescer and cache updates) happen inside one
//! `parking_lot::Mutex` critical section. The critical section never spans an
//! await point; external calls for admitted batches run concurrently on the
//! spawner, bounded by a semaphore of `chunk_size` permits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::batch::{AttemptLog, Batch, BatchAssembler, PendingItem, PendingPool};
use crate::core::cache::{CacheEntry, SharedCache};
use crate::core::coalescer::RequestCoalescer;
use crate::core::error::{SchedulerError, ServiceError};
use crate::core::executor::{BatchExecutor, BatchResponse, RequestPayload, ResultValue, Spawn};
use crate::core::quota::{QuotaSnapshot, QuotaTracker};
use crate::core::retry::RetryController;
use crate::core::subscription::SubscriptionHandle;
use crate::infra::queue::InMemoryPendingPool;
use crate::runtime::TokioSpawner;
use crate::util::clock::Clock;
use crate::util::serde::{BatchId, ResourceKey};

/// Lifecycle states of the coordinator and of individual batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    /// No pending work.
    Idle,
    /// Forming a batch from the pending pool.
    Draining,
    /// Waiting for quota to admit the next batch.
    Admitting,
    /// Handing an admitted batch to the executor.
    Dispatching,
    /// Batch sent, response outstanding.
    AwaitingResult,
    /// Storing results and notifying waiters and subscribers.
    Publishing,
    /// Failed items waiting out their retry delay.
    Retrying,
    /// Delivering terminal errors.
    Failing,
    /// Shut down.
    Stopped,
}

/// Point-in-time scheduler statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Distinct keys with outstanding work.
    pub pending_keys: usize,
    /// Items waiting in the pending pool for a batch.
    pub queued_items: usize,
    /// Batches handed to the service and awaiting a response.
    pub active_batches: usize,
    /// External calls made.
    pub dispatched_batches: u64,
    /// Values published to the cache.
    pub published_values: u64,
    /// Items re-enqueued after a failure.
    pub retried_items: u64,
    /// Keys resolved with a terminal error.
    pub failed_keys: u64,
    /// Requests answered from the cache.
    pub cache_hits: u64,
    /// Requests that joined an existing pending key.
    pub coalesced_requests: u64,
    /// Entries currently cached, after purging expired ones.
    pub cache_entries: usize,
    /// Payloads remembered for refresh; one per cached or pending key.
    pub tracked_payloads: usize,
    /// Quota consumption.
    pub quota: QuotaSnapshot,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    dispatched_batches: u64,
    published_values: u64,
    retried_items: u64,
    failed_keys: u64,
    cache_hits: u64,
    coalesced_requests: u64,
}

struct State<P, V, Q> {
    quota: QuotaTracker,
    coalescer: RequestCoalescer<P, V>,
    pool: Q,
    assembler: BatchAssembler,
    cache: SharedCache<V>,
    /// Last payload seen per key, so `refresh` can start a cycle without one.
    /// Only keys with a cache entry or a pending request are kept.
    payloads: HashMap<ResourceKey, P>,
    retry_timers: HashMap<BatchId, oneshot::Sender<()>>,
    active_batches: usize,
    next_seq: u64,
    phase: SchedulerPhase,
    counters: Counters,
}

impl<P, V, Q: PendingPool<P>> State<P, V, Q> {
    fn enqueue(&mut self, key: &str, payload: P, now: Instant) -> Result<(), SchedulerError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pool.push(PendingItem {
            key: key.to_owned(),
            payload,
            enqueued_at: now,
            seq,
            attempts: AttemptLog::default(),
        })
    }

    /// Forget the payload of `key` once nothing can refresh it.
    fn release_payload(&mut self, key: &str) {
        if !self.coalescer.contains(key) && self.cache.peek(key).is_none() {
            self.payloads.remove(key);
        }
    }

    /// Evict expired cache entries and the payloads they kept alive.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let evicted = self.cache.purge_expired(now);
        for key in &evicted {
            self.release_payload(key);
        }
        evicted.len()
    }
}

impl<P, V: Clone, Q: PendingPool<P>> State<P, V, Q> {
    /// Close the dispatched cycle of `key`. When a refresh arrived mid-flight
    /// the key is enqueued again and `true` is returned.
    fn complete(&mut self, key: &str, outcome: Result<V, SchedulerError>, now: Instant) -> bool
    where
        P: Clone,
    {
        let Some(payload) = self.coalescer.complete(key, outcome, now) else {
            self.release_payload(key);
            return false;
        };
        match self.enqueue(key, payload, now) {
            Ok(()) => true,
            Err(err) => {
                self.coalescer.resolve(key, Err(err));
                self.counters.failed_keys += 1;
                self.release_payload(key);
                false
            }
        }
    }
}

struct Inner<P, V, E, S, Q> {
    config: SchedulerConfig,
    retry: RetryController,
    executor: E,
    spawner: S,
    clock: Arc<dyn Clock>,
    state: Mutex<State<P, V, Q>>,
    audit: Option<Mutex<Box<dyn AuditSink>>>,
    wake: Notify,
    in_flight: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

impl<P, V, E, S, Q> Inner<P, V, E, S, Q> {
    fn audit(
        &self,
        action: AuditAction,
        batch_id: Option<BatchId>,
        key: Option<&str>,
        detail: Option<String>,
    ) {
        if let Some(sink) = &self.audit {
            sink.lock()
                .record(build_audit_event(action, batch_id, key, detail));
        }
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

fn trace_batch(batch_id: BatchId, phase: SchedulerPhase) {
    debug!(batch = batch_id, ?phase, "batch transition");
}

/// Quota-aware batch scheduler with a shared result cache.
///
/// Cloning is cheap; every clone drives the same coordinator.
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new(SchedulerConfig::default(), analyzer).build()?;
/// let handle = scheduler.subscribe("job-42", |entry| println!("v{}", entry.version));
/// let count = scheduler.request("job-42", job_query).await?;
/// scheduler.refresh("job-42");
/// ```
pub struct Scheduler<P, V, E, S = TokioSpawner, Q = InMemoryPendingPool<P>> {
    inner: Arc<Inner<P, V, E, S, Q>>,
}

impl<P, V, E, S, Q> Clone for Scheduler<P, V, E, S, Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, V, E, S, Q> Scheduler<P, V, E, S, Q>
where
    P: RequestPayload,
    V: ResultValue,
    E: BatchExecutor<P, V>,
    S: Spawn + Send + Sync + 'static,
    Q: PendingPool<P> + Send + 'static,
{
    /// Create a scheduler and start its coordinator loop on `spawner`.
    pub fn new(
        config: SchedulerConfig,
        executor: E,
        spawner: S,
        pool: Q,
        clock: Arc<dyn Clock>,
        audit: Option<Box<dyn AuditSink>>,
    ) -> Result<Self, SchedulerError> {
        config
            .validate()
            .map_err(|e| SchedulerError::Backend(format!("config invalid: {e}")))?;

        let state = State {
            quota: QuotaTracker::new(config.quota_limits(), Arc::clone(&clock)),
            coalescer: RequestCoalescer::new(),
            pool,
            assembler: BatchAssembler::new(),
            cache: SharedCache::new(config.cache_ttl()),
            payloads: HashMap::new(),
            retry_timers: HashMap::new(),
            active_batches: 0,
            next_seq: 0,
            phase: SchedulerPhase::Idle,
            counters: Counters::default(),
        };
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            retry: RetryController::new(config.retry_policy()),
            in_flight: Arc::new(Semaphore::new(config.chunk_size)),
            config,
            executor,
            spawner,
            clock,
            state: Mutex::new(state),
            audit: audit.map(Mutex::new),
            wake: Notify::new(),
            shutdown,
        });
        inner.spawner.spawn(Self::run(Arc::clone(&inner)));
        info!(
            minute_quota = inner.config.minute_quota_limit,
            daily_quota = inner.config.daily_quota_limit,
            max_batch_size = inner.config.max_batch_size,
            chunk_size = inner.config.chunk_size,
            "scheduler started"
        );
        Ok(Self { inner })
    }

    /// Resolve `key`, from the cache when fresh, otherwise by joining or
    /// creating a pending request.
    ///
    /// Every concurrent caller for the same key receives the same outcome from
    /// a single external call. Quota waits are invisible; only terminal
    /// failures surface as errors.
    pub async fn request(
        &self,
        key: impl Into<ResourceKey>,
        payload: P,
    ) -> Result<V, SchedulerError> {
        let key = key.into();
        let (receiver, is_owner) = {
            let mut state = self.inner.state.lock();
            if self.inner.is_shut_down() {
                return Err(SchedulerError::Shutdown);
            }
            let now = self.inner.clock.now();
            let cached = if state.coalescer.contains(&key) {
                None
            } else {
                state.cache.get(&key, now)
            };
            if let Some(entry) = cached {
                state.counters.cache_hits += 1;
                drop(state);
                self.inner
                    .audit(AuditAction::CacheHit, None, Some(key.as_str()), None);
                return Ok(entry.value.clone());
            }
            if !state.coalescer.contains(&key)
                && state.coalescer.len() >= self.inner.config.max_pending
            {
                let pending = state.coalescer.len();
                drop(state);
                warn!(key = %key, pending, "request rejected: pending limit reached");
                return Err(SchedulerError::QueueFull(format!(
                    "{pending} keys already pending"
                )));
            }

            state.payloads.insert(key.clone(), payload.clone());
            let (receiver, is_owner) = state.coalescer.acquire(&key, payload.clone(), now);
            if is_owner {
                if let Err(err) = state.enqueue(&key, payload, now) {
                    state.coalescer.resolve(&key, Err(err.clone()));
                    state.release_payload(&key);
                    return Err(err);
                }
            } else {
                state.counters.coalesced_requests += 1;
            }
            (receiver, is_owner)
        };

        if is_owner {
            debug!(key = %key, "request enqueued");
            self.inner
                .audit(AuditAction::Enqueue, None, Some(key.as_str()), None);
            self.inner.wake.notify_one();
        } else {
            debug!(key = %key, "request coalesced with pending key");
            self.inner
                .audit(AuditAction::Coalesce, None, Some(key.as_str()), None);
        }
        receiver.await.unwrap_or(Err(SchedulerError::Shutdown))
    }

    /// Call `on_update` with every value published for `key` from now on.
    pub fn subscribe<F>(&self, key: &str, on_update: F) -> SubscriptionHandle<V>
    where
        F: Fn(&CacheEntry<V>) + Send + Sync + 'static,
    {
        self.inner.state.lock().cache.subscribe(key, on_update)
    }

    /// Stop notifications for `handle`. Safe mid-flight; never cancels a
    /// dispatched batch. Returns `true` only on the first call.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle<V>) -> bool {
        let was_active = handle.unsubscribe();
        let collected = self
            .inner
            .state
            .lock()
            .cache
            .subscriptions_mut()
            .collect_garbage();
        debug!(subscription = handle.id(), collected, "unsubscribed");
        was_active
    }

    /// Invalidate `key` and start a new request cycle for it.
    ///
    /// A key still waiting in the pending pool is simply joined, since its call
    /// has not started. A key whose batch is already with the service gets a
    /// follow-up cycle once that batch resolves; requests made after the
    /// refresh wait for it. Keys never requested before are only invalidated,
    /// since there is no payload to send. Returns whether a new cycle was
    /// scheduled.
    pub fn refresh(&self, key: &str) -> bool {
        let scheduled = {
            let mut state = self.inner.state.lock();
            if self.inner.is_shut_down() {
                return false;
            }
            let now = self.inner.clock.now();
            state.cache.invalidate(key);
            if state.coalescer.contains(key) {
                state.coalescer.defer_refresh(key)
            } else if let Some(payload) = state.payloads.get(key).cloned() {
                state.coalescer.register(key, payload.clone(), now);
                match state.enqueue(key, payload, now) {
                    Ok(()) => true,
                    Err(err) => {
                        state.coalescer.resolve(key, Err(err));
                        state.release_payload(key);
                        false
                    }
                }
            } else {
                false
            }
        };

        self.inner.audit(
            AuditAction::Refresh,
            None,
            Some(key),
            Some(format!("scheduled={scheduled}")),
        );
        if scheduled {
            debug!(key, "refresh scheduled");
            self.inner.wake.notify_one();
        }
        scheduled
    }

    /// Fresh cache entry for `key`, without triggering a request.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        let now = self.inner.clock.now();
        self.inner.state.lock().cache.get(key, now)
    }

    /// Last published entry for `key`, even if past its ttl.
    pub fn peek(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.inner.state.lock().cache.peek(key)
    }

    /// Current coordinator phase.
    pub fn phase(&self) -> SchedulerPhase {
        self.inner.state.lock().phase
    }

    /// Point-in-time statistics. Expired cache entries are purged first.
    pub fn stats(&self) -> SchedulerStats {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.purge_expired(now);
        SchedulerStats {
            pending_keys: state.coalescer.len(),
            queued_items: state.pool.len(),
            active_batches: state.active_batches,
            dispatched_batches: state.counters.dispatched_batches,
            published_values: state.counters.published_values,
            retried_items: state.counters.retried_items,
            failed_keys: state.counters.failed_keys,
            cache_hits: state.counters.cache_hits,
            coalesced_requests: state.counters.coalesced_requests,
            cache_entries: state.cache.len(),
            tracked_payloads: state.payloads.len(),
            quota: state.quota.snapshot(),
        }
    }

    /// Stop the coordinator, cancel retry timers and fail every outstanding
    /// waiter with [`SchedulerError::Shutdown`]. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        let failed = {
            let mut state = self.inner.state.lock();
            state.retry_timers.clear();
            state.phase = SchedulerPhase::Stopped;
            state.coalescer.fail_all(&SchedulerError::Shutdown)
        };
        info!(failed, "scheduler shut down");
    }

    async fn run(inner: Arc<Inner<P, V, E, S, Q>>) {
        let mut shutdown = inner.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let permit = tokio::select! {
                permit = Arc::clone(&inner.in_flight).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            let drained = {
                let mut guard = inner.state.lock();
                let state = &mut *guard;
                state.phase = SchedulerPhase::Draining;
                let purged = state.purge_expired(inner.clock.now());
                if purged > 0 {
                    debug!(purged, "expired cache entries purged");
                }
                let batch = state
                    .assembler
                    .drain(&mut state.pool, inner.config.max_batch_size);
                if batch.is_none() {
                    state.phase = SchedulerPhase::Idle;
                }
                batch
            };
            let Some(batch) = drained else {
                drop(permit);
                tokio::select! {
                    () = inner.wake.notified() => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            };

            if !Self::admit(&inner, &batch, &mut shutdown).await {
                break;
            }
            inner.state.lock().phase = SchedulerPhase::Dispatching;
            let task_inner = Arc::clone(&inner);
            inner.spawner.spawn(async move {
                Self::dispatch(task_inner, batch, permit).await;
            });

            tokio::select! {
                () = tokio::time::sleep(inner.config.delay_between_batches()) => {}
                _ = shutdown.changed() => break,
            }
        }
        inner.state.lock().phase = SchedulerPhase::Stopped;
        info!("coordinator loop stopped");
    }

    /// Hold `batch` until the quota admits it. Returns `false` on shutdown.
    async fn admit(
        inner: &Inner<P, V, E, S, Q>,
        batch: &Batch<P>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let mut deferred = false;
        loop {
            let wait = {
                let mut state = inner.state.lock();
                state.phase = SchedulerPhase::Admitting;
                if state.quota.try_admit(1) {
                    drop(state);
                    inner.audit(AuditAction::Admit, Some(batch.id), None, None);
                    return true;
                }
                state.quota.admission_delay(1)
            };
            let wait = wait.max(inner.config.delay_between_batches());
            if !deferred {
                deferred = true;
                debug!(batch = batch.id, ?wait, "batch deferred by quota");
                inner.audit(
                    AuditAction::Defer,
                    Some(batch.id),
                    None,
                    Some(format!("{wait:?}")),
                );
            }
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => return false,
            }
        }
    }

    async fn dispatch(
        inner: Arc<Inner<P, V, E, S, Q>>,
        mut batch: Batch<P>,
        permit: OwnedSemaphorePermit,
    ) {
        batch.dispatched_at = Some(inner.clock.now());
        let meta = batch.metadata();
        let items = batch.request_items();
        {
            let mut state = inner.state.lock();
            for item in &batch.items {
                state.coalescer.mark_dispatched(&item.key);
            }
            state.active_batches += 1;
            state.counters.dispatched_batches += 1;
        }
        inner.audit(
            AuditAction::Dispatch,
            Some(meta.id),
            None,
            Some(format!("size={} attempt={}", meta.size, meta.attempt)),
        );
        info!(
            batch = meta.id,
            size = meta.size,
            attempt = meta.attempt,
            "dispatching batch"
        );
        trace_batch(meta.id, SchedulerPhase::AwaitingResult);

        let timeout = inner.config.request_timeout();
        let result =
            match tokio::time::timeout(timeout, inner.executor.execute(items, meta)).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout(timeout)),
            };
        inner.state.lock().active_batches -= 1;
        drop(permit);

        match result {
            Ok(values) => Self::publish(&inner, batch, values),
            Err(err) => Self::fail_or_retry(&inner, batch, &err),
        }
    }

    fn publish(inner: &Inner<P, V, E, S, Q>, batch: Batch<P>, mut values: BatchResponse<V>) {
        trace_batch(batch.id, SchedulerPhase::Publishing);
        let now = inner.clock.now();
        let mut fanouts = Vec::with_capacity(batch.len());
        let mut missing = Vec::new();
        let mut restarted = Vec::new();
        {
            let mut state = inner.state.lock();
            for item in &batch.items {
                let outcome = if let Some(value) = values.remove(&item.key) {
                    fanouts.push(state.cache.stage_publish(&item.key, value.clone(), now));
                    state.counters.published_values += 1;
                    Ok(value)
                } else {
                    state.counters.failed_keys += 1;
                    missing.push(item.key.as_str());
                    Err(SchedulerError::MissingResult(item.key.clone()))
                };
                if state.complete(&item.key, outcome, now) {
                    restarted.push(item.key.as_str());
                }
            }
        }

        if !values.is_empty() {
            debug!(
                batch = batch.id,
                extra = values.len(),
                "ignoring unrequested keys in response"
            );
        }
        for &key in &missing {
            warn!(batch = batch.id, key, "response omitted requested key");
            inner.audit(
                AuditAction::Fail,
                Some(batch.id),
                Some(key),
                Some("missing from response".into()),
            );
        }
        let published = fanouts.len();
        for fanout in fanouts {
            inner.audit(
                AuditAction::Publish,
                Some(batch.id),
                Some(fanout.entry().key.as_str()),
                Some(format!("version={}", fanout.entry().version)),
            );
            fanout.deliver();
        }
        info!(
            batch = batch.id,
            published,
            missing = missing.len(),
            "batch resolved"
        );
        Self::announce_restarts(inner, batch.id, &restarted);
    }

    fn announce_restarts(inner: &Inner<P, V, E, S, Q>, batch_id: BatchId, keys: &[&str]) {
        if keys.is_empty() {
            return;
        }
        for &key in keys {
            debug!(batch = batch_id, key, "refreshed key re-enqueued");
            inner.audit(
                AuditAction::Enqueue,
                Some(batch_id),
                Some(key),
                Some("refresh".into()),
            );
        }
        inner.wake.notify_one();
    }

    fn fail_or_retry(inner: &Arc<Inner<P, V, E, S, Q>>, batch: Batch<P>, error: &ServiceError) {
        let kind = inner.retry.classify(error);
        let batch_id = batch.id;
        let mut retry_items = Vec::new();
        let mut retry_delay = None;
        let mut failed = Vec::new();
        let mut restarted = Vec::new();
        let now = inner.clock.now();
        {
            let mut state = inner.state.lock();
            for mut item in batch.items {
                let attempt = item.attempts.record(kind);
                if let Some(delay) = inner.retry.next_delay(attempt, kind) {
                    state.coalescer.mark_queued(&item.key);
                    retry_delay = Some(delay);
                    retry_items.push(item);
                } else {
                    let terminal = inner.retry.terminal_error(kind, attempt, error);
                    state.counters.failed_keys += 1;
                    if state.complete(&item.key, Err(terminal), now) {
                        restarted.push(item.key.clone());
                    }
                    failed.push(item.key);
                }
            }
            if let Some(delay) = retry_delay {
                if inner.is_shut_down() {
                    retry_delay = None;
                } else {
                    state.counters.retried_items +=
                        u64::try_from(retry_items.len()).unwrap_or(u64::MAX);
                    let cancel = Self::schedule_retry(inner, batch_id, retry_items, delay);
                    state.retry_timers.insert(batch_id, cancel);
                }
            }
        }

        if !failed.is_empty() {
            trace_batch(batch_id, SchedulerPhase::Failing);
            error!(
                batch = batch_id,
                ?kind,
                failed = failed.len(),
                %error,
                "batch failed terminally"
            );
            for key in &failed {
                inner.audit(
                    AuditAction::Fail,
                    Some(batch_id),
                    Some(key.as_str()),
                    Some(error.to_string()),
                );
            }
        }
        if let Some(delay) = retry_delay {
            trace_batch(batch_id, SchedulerPhase::Retrying);
            warn!(batch = batch_id, ?kind, ?delay, %error, "batch scheduled for retry");
            inner.audit(
                AuditAction::Retry,
                Some(batch_id),
                None,
                Some(format!("{kind:?} after {delay:?}")),
            );
        }
        let restarted: Vec<&str> = restarted.iter().map(String::as_str).collect();
        Self::announce_restarts(inner, batch_id, &restarted);
    }

    /// Spawn a timer that re-enqueues `items` after `delay`. Dropping the
    /// returned sender cancels the timer.
    fn schedule_retry(
        inner: &Arc<Inner<P, V, E, S, Q>>,
        batch_id: BatchId,
        items: Vec<PendingItem<P>>,
        delay: Duration,
    ) -> oneshot::Sender<()> {
        let (cancel, cancelled) = oneshot::channel::<()>();
        let task_inner = Arc::clone(inner);
        inner.spawner.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => Self::requeue(&task_inner, batch_id, items),
                _ = cancelled => debug!(batch = batch_id, "retry timer cancelled"),
            }
        });
        cancel
    }

    fn requeue(inner: &Inner<P, V, E, S, Q>, batch_id: BatchId, items: Vec<PendingItem<P>>) {
        let mut requeued = 0_usize;
        {
            let mut state = inner.state.lock();
            state.retry_timers.remove(&batch_id);
            for item in items {
                if !state.coalescer.contains(&item.key) {
                    continue;
                }
                let key = item.key.clone();
                match state.pool.push(item) {
                    Ok(()) => requeued += 1,
                    Err(err) => {
                        state.coalescer.resolve(&key, Err(err));
                        state.counters.failed_keys += 1;
                        state.release_payload(&key);
                    }
                }
            }
        }
        debug!(batch = batch_id, requeued, "retry items re-enqueued");
        inner.wake.notify_one();
    }
}
