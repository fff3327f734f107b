//! Failure classification and retry scheduling.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{SchedulerError, ServiceError};

/// How a failed dispatch should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Client-side or validation failure; never retried.
    Permanent,
    /// Network failure, timeout or server error; retried a bounded number of times.
    Transient,
    /// Provider rate limit hit; retried after a long fixed delay.
    QuotaExceeded,
}

/// Retry limits and delays per failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Transient failures tolerated before giving up (counting the first).
    pub max_retries: u32,
    /// Delay before retrying a transient failure.
    pub retry_delay: Duration,
    /// Quota failures tolerated before giving up.
    pub max_quota_retries: u32,
    /// Delay before retrying a quota failure.
    pub quota_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_quota_retries: 120,
            quota_retry_delay: Duration::from_millis(30_000),
        }
    }
}

/// Stateless retry decisions driven by a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    /// Create a controller for `policy`.
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Map a service error onto a failure kind.
    ///
    /// Status 429 is a quota failure; 408 and 5xx are transient; any other
    /// status is permanent.
    pub const fn classify(&self, error: &ServiceError) -> FailureKind {
        match error {
            ServiceError::QuotaExceeded(_) | ServiceError::Status { status: 429, .. } => {
                FailureKind::QuotaExceeded
            }
            ServiceError::Status {
                status: 408 | 500..=599,
                ..
            }
            | ServiceError::Network(_)
            | ServiceError::Timeout(_) => FailureKind::Transient,
            ServiceError::Status { .. } | ServiceError::Invalid(_) => FailureKind::Permanent,
        }
    }

    /// Delay before the next attempt, or `None` to give up.
    ///
    /// `attempt` is the number of failures of this kind observed so far,
    /// including the one being handled.
    pub const fn next_delay(&self, attempt: u32, kind: FailureKind) -> Option<Duration> {
        match kind {
            FailureKind::Permanent => None,
            FailureKind::Transient if attempt < self.policy.max_retries => {
                Some(self.policy.retry_delay)
            }
            FailureKind::QuotaExceeded if attempt < self.policy.max_quota_retries => {
                Some(self.policy.quota_retry_delay)
            }
            FailureKind::Transient | FailureKind::QuotaExceeded => None,
        }
    }

    /// Error delivered to waiters once retries stop.
    pub fn terminal_error(
        &self,
        kind: FailureKind,
        attempts: u32,
        cause: &ServiceError,
    ) -> SchedulerError {
        match kind {
            FailureKind::Permanent => SchedulerError::Rejected(cause.to_string()),
            FailureKind::Transient => SchedulerError::RetriesExhausted {
                attempts,
                reason: cause.to_string(),
            },
            FailureKind::QuotaExceeded => SchedulerError::QuotaExhausted {
                attempts,
                reason: cause.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ServiceError {
        ServiceError::Status {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn classifies_provider_errors() {
        let retry = RetryController::default();
        assert_eq!(retry.classify(&status(429)), FailureKind::QuotaExceeded);
        assert_eq!(
            retry.classify(&ServiceError::QuotaExceeded("daily".into())),
            FailureKind::QuotaExceeded
        );
        assert_eq!(retry.classify(&status(503)), FailureKind::Transient);
        assert_eq!(retry.classify(&status(408)), FailureKind::Transient);
        assert_eq!(
            retry.classify(&ServiceError::Timeout(Duration::from_secs(8))),
            FailureKind::Transient
        );
        assert_eq!(
            retry.classify(&ServiceError::Network("reset".into())),
            FailureKind::Transient
        );
        assert_eq!(retry.classify(&status(400)), FailureKind::Permanent);
        assert_eq!(
            retry.classify(&ServiceError::Invalid("bad cv".into())),
            FailureKind::Permanent
        );
    }

    #[test]
    fn transient_failures_stop_at_max_retries() {
        let retry = RetryController::default();
        assert_eq!(
            retry.next_delay(1, FailureKind::Transient),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            retry.next_delay(2, FailureKind::Transient),
            Some(Duration::from_secs(1))
        );
        assert_eq!(retry.next_delay(3, FailureKind::Transient), None);
    }

    #[test]
    fn quota_failures_use_long_delay() {
        let retry = RetryController::new(RetryPolicy {
            max_quota_retries: 2,
            ..RetryPolicy::default()
        });
        assert_eq!(
            retry.next_delay(1, FailureKind::QuotaExceeded),
            Some(Duration::from_secs(30))
        );
        assert_eq!(retry.next_delay(2, FailureKind::QuotaExceeded), None);
    }

    #[test]
    fn permanent_failures_never_retry() {
        let retry = RetryController::default();
        assert_eq!(retry.next_delay(0, FailureKind::Permanent), None);
        let err = retry.terminal_error(FailureKind::Permanent, 1, &status(404));
        assert!(matches!(err, SchedulerError::Rejected(_)));
    }
}
