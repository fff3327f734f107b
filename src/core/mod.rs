//! Core scheduling abstractions: quota admission, coalescing, batching,
//! retries, the shared cache and the orchestrator tying them together.

pub mod audit;
pub mod batch;
pub mod cache;
pub mod coalescer;
pub mod error;
pub mod executor;
pub mod quota;
pub mod retry;
pub mod scheduler;
pub mod subscription;

pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, build_audit_event};
pub use batch::{
    AttemptLog, Batch, BatchAssembler, BatchItem, BatchMetadata, PendingItem, PendingPool,
};
pub use cache::{CacheEntry, Fanout, SharedCache};
pub use coalescer::{Outcome, OutcomeReceiver, PendingRequest, RequestCoalescer};
pub use error::{AppResult, SchedulerError, ServiceError};
pub use executor::{BatchExecutor, BatchResponse, RequestPayload, ResultValue, Spawn};
pub use quota::{QUOTA_WINDOW, QuotaLimits, QuotaSnapshot, QuotaTracker};
pub use retry::{FailureKind, RetryController, RetryPolicy};
pub use scheduler::{Scheduler, SchedulerPhase, SchedulerStats};
pub use subscription::{Subscription, SubscriptionHandle, SubscriptionRegistry};
