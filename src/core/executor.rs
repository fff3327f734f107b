//! External service abstraction and runtime spawning.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;

use crate::core::batch::{BatchItem, BatchMetadata};
use crate::core::error::ServiceError;
use crate::util::serde::ResourceKey;

/// Marker trait for request payloads.
///
/// Payloads are cloned into every batch that carries their key, so retries
/// can resend them without consulting the caller again.
pub trait RequestPayload: Clone + Send + Sync + 'static {}

/// Blanket implementation: any type meeting the requirements is a `RequestPayload`.
impl<T> RequestPayload for T where T: Clone + Send + Sync + 'static {}

/// Marker trait for values produced by the external service.
///
/// Values are cloned once per waiter and once into the shared cache.
pub trait ResultValue: Clone + Send + Sync + 'static {}

/// Blanket implementation: any type meeting the requirements is a `ResultValue`.
impl<T> ResultValue for T where T: Clone + Send + Sync + 'static {}

/// Per-item results of one successful batch call, keyed by the submitted keys.
pub type BatchResponse<V> = HashMap<ResourceKey, V>;

/// Client for the rate-limited external service.
///
/// The scheduler guarantees at most `max_batch_size` items per call and at
/// most one call per admitted quota unit. Implementations map provider errors
/// onto [`ServiceError`] so the retry policy can classify them.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use quota_batch_scheduler::core::{BatchExecutor, BatchItem, BatchMetadata, BatchResponse, ServiceError};
///
/// #[derive(Clone)]
/// struct CandidateCounter;
///
/// #[async_trait]
/// impl BatchExecutor<String, u32> for CandidateCounter {
///     async fn execute(
///         &self,
///         items: Vec<BatchItem<String>>,
///         _meta: BatchMetadata,
///     ) -> Result<BatchResponse<u32>, ServiceError> {
///         Ok(items.into_iter().map(|item| (item.key, 0)).collect())
///     }
/// }
/// ```
#[async_trait]
pub trait BatchExecutor<P, V>: Send + Sync + Clone + 'static
where
    P: RequestPayload,
    V: ResultValue,
{
    /// Send one batch to the external service.
    ///
    /// Keys absent from a successful response are failed individually; extra
    /// keys are ignored.
    async fn execute(
        &self,
        items: Vec<BatchItem<P>>,
        meta: BatchMetadata,
    ) -> Result<BatchResponse<V>, ServiceError>;
}

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn a future that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
