//! Pending pool abstraction and size-bounded batch formation.

use tokio::time::Instant;

use crate::core::error::SchedulerError;
use crate::core::retry::FailureKind;
use crate::util::serde::{BatchId, ResourceKey};

/// Failures recorded against one item, counted per retryable kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptLog {
    /// Transient failures so far.
    pub transient: u32,
    /// Quota failures so far.
    pub quota: u32,
}

impl AttemptLog {
    /// Record a failure of `kind` and return the updated count for that kind.
    pub fn record(&mut self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::Transient => {
                self.transient += 1;
                self.transient
            }
            FailureKind::QuotaExceeded => {
                self.quota += 1;
                self.quota
            }
            FailureKind::Permanent => 1,
        }
    }

    /// Total failed attempts.
    pub const fn total(&self) -> u32 {
        self.transient + self.quota
    }
}

/// A key waiting in the pending pool for its next dispatch.
#[derive(Debug, Clone)]
pub struct PendingItem<P> {
    /// Key to resolve.
    pub key: ResourceKey,
    /// Payload sent to the service.
    pub payload: P,
    /// When the key was first requested. Retries keep the original value.
    pub enqueued_at: Instant,
    /// Arrival sequence, used to break ties between equal instants.
    pub seq: u64,
    /// Failures recorded so far.
    pub attempts: AttemptLog,
}

/// Storage for items awaiting batch formation.
pub trait PendingPool<P> {
    /// Add an item if space permits.
    fn push(&mut self, item: PendingItem<P>) -> Result<(), SchedulerError>;
    /// Remove the oldest item by `(enqueued_at, seq)`.
    fn pop_oldest(&mut self) -> Option<PendingItem<P>>;
    /// Maximum number of items held.
    fn max_depth(&self) -> usize;
    /// Current number of items.
    fn len(&self) -> usize;
    /// Whether the pool holds no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One entry of a batch as seen by the external service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem<P> {
    /// Item identifier echoed back in the response map.
    pub key: ResourceKey,
    /// Item payload.
    pub payload: P,
}

/// Metadata passed to the executor alongside the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchMetadata {
    /// Batch identifier.
    pub id: BatchId,
    /// 1 for a first dispatch, higher when the batch carries retried items.
    pub attempt: u32,
    /// Number of items.
    pub size: usize,
}

/// A bounded group of pending items dispatched in one external call.
#[derive(Debug)]
pub struct Batch<P> {
    /// Batch identifier.
    pub id: BatchId,
    /// Items in enqueue order.
    pub items: Vec<PendingItem<P>>,
    /// When the batch was handed to the executor.
    pub dispatched_at: Option<Instant>,
    /// Highest attempt number among the items.
    pub attempt: u32,
}

impl<P> Batch<P> {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys in batch order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.key.as_str())
    }

    /// Metadata describing this batch.
    pub fn metadata(&self) -> BatchMetadata {
        BatchMetadata {
            id: self.id,
            attempt: self.attempt,
            size: self.items.len(),
        }
    }
}

impl<P: Clone> Batch<P> {
    /// Items as sent to the executor. The batch keeps its own copy for retries.
    pub fn request_items(&self) -> Vec<BatchItem<P>> {
        self.items
            .iter()
            .map(|item| BatchItem {
                key: item.key.clone(),
                payload: item.payload.clone(),
            })
            .collect()
    }
}

/// Forms batches from a pending pool. Does not consult quota.
#[derive(Debug, Default)]
pub struct BatchAssembler {
    last_id: BatchId,
}

impl BatchAssembler {
    /// Create an assembler whose first batch has id 1.
    pub const fn new() -> Self {
        Self { last_id: 0 }
    }

    /// Take up to `max_items` of the oldest items and form one batch.
    ///
    /// Returns `None` when the pool is empty or `max_items` is zero.
    pub fn drain<P, Q>(&mut self, pool: &mut Q, max_items: usize) -> Option<Batch<P>>
    where
        Q: PendingPool<P> + ?Sized,
    {
        if max_items == 0 || pool.is_empty() {
            return None;
        }
        let mut items = Vec::with_capacity(max_items.min(pool.len()));
        while items.len() < max_items {
            match pool.pop_oldest() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        if items.is_empty() {
            return None;
        }

        let attempt = items
            .iter()
            .map(|item: &PendingItem<P>| item.attempts.total())
            .max()
            .unwrap_or(0)
            + 1;
        self.last_id += 1;
        Some(Batch {
            id: self.last_id,
            items,
            dispatched_at: None,
            attempt,
        })
    }
}
