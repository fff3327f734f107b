//! Tests for error types

use std::time::Duration;

use quota_batch_scheduler::core::{SchedulerError, ServiceError};

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("3 keys already pending".to_string());
    assert_eq!(format!("{}", err), "queue full: 3 keys already pending");
}

#[test]
fn test_retries_exhausted_error() {
    let err = SchedulerError::RetriesExhausted {
        attempts: 3,
        reason: "network failure: reset".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "retries exhausted after 3 attempts: network failure: reset"
    );
}

#[test]
fn test_missing_result_error() {
    let err = SchedulerError::MissingResult("job-42".to_string());
    assert_eq!(format!("{}", err), "no result returned for key `job-42`");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", SchedulerError::Shutdown), "scheduler shut down");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}

#[test]
fn test_service_error_display() {
    let status = ServiceError::Status {
        status: 503,
        message: "unavailable".to_string(),
    };
    assert_eq!(format!("{}", status), "service returned status 503: unavailable");
    assert_eq!(
        format!("{}", ServiceError::Timeout(Duration::from_secs(8))),
        "request timed out after 8s"
    );
}
