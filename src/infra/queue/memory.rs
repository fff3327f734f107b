//! In-memory pending pool ordered by enqueue time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::SchedulerError;
use crate::core::{PendingItem, PendingPool};

/// Wrapper ordering items oldest-first in a max-heap.
struct OldestFirst<P> {
    item: PendingItem<P>,
}

impl<P> PartialEq for OldestFirst<P> {
    fn eq(&self, other: &Self) -> bool {
        self.item.seq == other.item.seq && self.item.enqueued_at == other.item.enqueued_at
    }
}

impl<P> Eq for OldestFirst<P> {}

impl<P> PartialOrd for OldestFirst<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for OldestFirst<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for max-heap: earlier enqueue wins, then lower sequence.
        other
            .item
            .enqueued_at
            .cmp(&self.item.enqueued_at)
            .then_with(|| other.item.seq.cmp(&self.item.seq))
    }
}

/// In-memory pending pool backed by a binary heap.
/// Push and pop are O(log n).
pub struct InMemoryPendingPool<P> {
    max_depth: usize,
    items: BinaryHeap<OldestFirst<P>>,
}

impl<P> InMemoryPendingPool<P> {
    /// Create a pool holding at most `max_depth` items.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            items: BinaryHeap::with_capacity(max_depth.min(1024)),
        }
    }
}

impl<P> PendingPool<P> for InMemoryPendingPool<P> {
    fn push(&mut self, item: PendingItem<P>) -> Result<(), SchedulerError> {
        if self.len() >= self.max_depth() {
            return Err(SchedulerError::QueueFull("max pending depth reached".into()));
        }
        self.items.push(OldestFirst { item });
        Ok(())
    }

    fn pop_oldest(&mut self) -> Option<PendingItem<P>> {
        self.items.pop().map(|entry| entry.item)
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::core::AttemptLog;

    fn item(key: &str, enqueued_at: Instant, seq: u64) -> PendingItem<()> {
        PendingItem {
            key: key.to_string(),
            payload: (),
            enqueued_at,
            seq,
            attempts: AttemptLog::default(),
        }
    }

    #[test]
    fn pops_by_enqueue_time() {
        let base = Instant::now();
        let mut pool = InMemoryPendingPool::new(10);
        pool.push(item("late", base + Duration::from_secs(3), 0)).unwrap();
        pool.push(item("early", base, 1)).unwrap();
        pool.push(item("middle", base + Duration::from_secs(1), 2)).unwrap();

        assert_eq!(pool.pop_oldest().unwrap().key, "early");
        assert_eq!(pool.pop_oldest().unwrap().key, "middle");
        assert_eq!(pool.pop_oldest().unwrap().key, "late");
        assert!(pool.pop_oldest().is_none());
    }

    #[test]
    fn sequence_breaks_ties() {
        let now = Instant::now();
        let mut pool = InMemoryPendingPool::new(10);
        pool.push(item("b", now, 2)).unwrap();
        pool.push(item("c", now, 3)).unwrap();
        pool.push(item("a", now, 1)).unwrap();

        let order: Vec<_> = std::iter::from_fn(|| pool.pop_oldest()).map(|i| i.key).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn rejects_past_max_depth() {
        let now = Instant::now();
        let mut pool = InMemoryPendingPool::new(2);
        pool.push(item("a", now, 0)).unwrap();
        pool.push(item("b", now, 1)).unwrap();
        assert!(matches!(
            pool.push(item("c", now, 2)),
            Err(SchedulerError::QueueFull(_))
        ));
        assert_eq!(pool.len(), 2);
    }
}
