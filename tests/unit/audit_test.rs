//! Tests for audit sink

use quota_batch_scheduler::core::{AuditAction, AuditSink, InMemoryAuditSink, build_audit_event};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(AuditAction::Enqueue, None, Some("job-1"), None);
    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].action, AuditAction::Enqueue);
    assert_eq!(events[0].key.as_deref(), Some("job-1"));
    assert_eq!(sink.count(AuditAction::Enqueue), 1);
    assert_eq!(sink.count(AuditAction::Dispatch), 0);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(AuditAction::Dispatch, Some(1), None, None));
    sink.record(build_audit_event(AuditAction::Dispatch, Some(2), None, None));
    sink.record(build_audit_event(AuditAction::Dispatch, Some(3), None, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].batch_id, Some(2)); // First one popped
    assert_eq!(events[1].batch_id, Some(3));
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(10);
    let mut writer = sink.clone();
    writer.record(build_audit_event(AuditAction::Publish, Some(7), Some("job-7"), None));
    assert_eq!(sink.count(AuditAction::Publish), 1);
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(
        AuditAction::Retry,
        Some(4),
        Some("job-4"),
        Some("Transient after 1s".to_string()),
    );

    assert_eq!(event.action, AuditAction::Retry);
    assert_eq!(event.batch_id, Some(4));
    assert_eq!(event.key, Some("job-4".to_string()));
    assert_eq!(event.detail, Some("Transient after 1s".to_string()));
    assert!(!event.event_id.is_empty());
    assert!(event.created_at_ms > 0);

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"action\":\"retry\""));
}
