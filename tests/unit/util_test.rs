//! Tests for utility functions

use std::time::Duration;

use quota_batch_scheduler::util::{
    BatchId, Clock, ManualClock, ResourceKey, SECONDS_PER_DAY, SystemClock, now_ms,
};

#[test]
fn test_manual_clock_day_boundary() {
    let clock = ManualClock::starting_at(Duration::from_secs(SECONDS_PER_DAY * 3 + 30));
    assert_eq!(clock.day(), 3);
    assert_eq!(clock.until_next_day(), Duration::from_secs(SECONDS_PER_DAY - 30));

    clock.advance(Duration::from_secs(SECONDS_PER_DAY));
    assert_eq!(clock.day(), 4);
}

#[test]
fn test_system_clock_until_next_day_within_a_day() {
    let clock = SystemClock;
    let remaining = clock.until_next_day();
    assert!(remaining > Duration::ZERO);
    assert!(remaining <= Duration::from_secs(SECONDS_PER_DAY));
    assert!(clock.day() > 0);
}

#[test]
fn test_now_ms_is_after_epoch() {
    assert!(now_ms() > 0);
}

#[test]
fn test_identifier_aliases() {
    let key: ResourceKey = "job-42".to_string();
    let id: BatchId = 12345;
    assert_eq!(key, "job-42");
    assert_eq!(id, 12345);
}

#[test]
fn test_init_tracing_is_idempotent() {
    quota_batch_scheduler::util::init_tracing();
    quota_batch_scheduler::util::init_tracing();
}
