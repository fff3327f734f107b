//! Error types for scheduler operations and the external service boundary.

use std::time::Duration;

use thiserror::Error;

use crate::util::serde::ResourceKey;

/// Failure reported by the external batch service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The provider explicitly reported its rate limit as exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    /// The provider answered with an HTTP-like status code.
    #[error("service returned status {status}: {message}")]
    Status {
        /// Status code returned by the provider.
        status: u16,
        /// Provider message.
        message: String,
    },
    /// The call failed before a response arrived.
    #[error("network failure: {0}")]
    Network(String),
    /// No response arrived within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The provider rejected the request contents.
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Errors produced by the scheduler. Terminal request outcomes are cloned to
/// every waiter of the affected key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Too many distinct keys are already outstanding.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// The provider kept reporting quota exhaustion.
    #[error("quota still exhausted after {attempts} attempts: {reason}")]
    QuotaExhausted {
        /// Number of quota failures observed.
        attempts: u32,
        /// Last provider message.
        reason: String,
    },
    /// Transient failures persisted past the retry limit.
    #[error("retries exhausted after {attempts} attempts: {reason}")]
    RetriesExhausted {
        /// Number of transient failures observed.
        attempts: u32,
        /// Last failure description.
        reason: String,
    },
    /// The provider rejected the request permanently.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// A successful batch response did not contain this key.
    #[error("no result returned for key `{0}`")]
    MissingResult(ResourceKey),
    /// The scheduler was shut down before the request resolved.
    #[error("scheduler shut down")]
    Shutdown,
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
