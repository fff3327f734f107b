//! Audit sink implementations.
//!
//! Records scheduler lifecycle events for diagnostics and tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;
use crate::util::serde::{BatchId, ResourceKey};

/// Lifecycle step being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A new pending request was created.
    Enqueue,
    /// A caller joined an existing pending request.
    Coalesce,
    /// A request was served from the cache.
    CacheHit,
    /// A batch consumed a quota unit.
    Admit,
    /// A batch was held back by the quota.
    Defer,
    /// A batch was sent to the service.
    Dispatch,
    /// A value was published for a key.
    Publish,
    /// Items were scheduled for another attempt.
    Retry,
    /// A key received a terminal error.
    Fail,
    /// A key was invalidated by a refresh.
    Refresh,
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Action taken.
    pub action: AuditAction,
    /// Related batch, when the event concerns a batch.
    pub batch_id: Option<BatchId>,
    /// Related key, when the event concerns a single key.
    pub key: Option<ResourceKey>,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Bounded in-memory audit sink. Clones share the same buffer, so a caller can
/// keep one clone for inspection after handing another to the scheduler.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of stored events with `action`.
    pub fn count(&self, action: AuditAction) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.action == action)
            .count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an audit event stamped with the current time.
pub fn build_audit_event(
    action: AuditAction,
    batch_id: Option<BatchId>,
    key: Option<&str>,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        action,
        batch_id,
        key: key.map(str::to_owned),
        created_at_ms: now_ms(),
        detail,
    }
}
