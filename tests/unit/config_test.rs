//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use quota_batch_scheduler::config::SchedulerConfig;

#[test]
fn test_default_config_is_valid() {
    let config = SchedulerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.minute_quota_limit, 30);
    assert_eq!(config.daily_quota_limit, 200);
    assert_eq!(config.max_batch_size, 15);
    assert_eq!(config.chunk_size, 5);
    assert_eq!(config.request_timeout(), Duration::from_millis(8000));
    assert_eq!(config.cache_ttl(), None);
}

#[test]
fn test_config_invalid_batch_size() {
    let invalid = SchedulerConfig {
        max_batch_size: 0,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_daily_below_minute() {
    let invalid = SchedulerConfig {
        minute_quota_limit: 50,
        daily_quota_limit: 10,
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_zero_ttl() {
    let invalid = SchedulerConfig {
        cache_ttl_ms: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "minute_quota_limit": 10,
        "daily_quota_limit": 100,
        "cache_ttl_ms": 60000
    }"#;

    let config = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(config.minute_quota_limit, 10);
    assert_eq!(config.daily_quota_limit, 100);
    assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
    assert_eq!(config.max_batch_size, 15);
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"chunk_size": 0}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("MINUTE_QUOTA_LIMIT", "12"),
        ("MAX_BATCH_SIZE", " 8 "),
        ("RETRY_DELAY", "250"),
        ("CACHE_TTL", "5000"),
    ]
    .into_iter()
    .collect();

    let config =
        SchedulerConfig::from_lookup(|name| vars.get(name).map(|v| (*v).to_string())).unwrap();
    assert_eq!(config.minute_quota_limit, 12);
    assert_eq!(config.max_batch_size, 8);
    assert_eq!(config.retry_policy().retry_delay, Duration::from_millis(250));
    assert_eq!(config.cache_ttl(), Some(Duration::from_secs(5)));
    assert_eq!(config.daily_quota_limit, 200);
}

#[test]
fn test_config_from_lookup_rejects_garbage() {
    let err = SchedulerConfig::from_lookup(|name| {
        (name == "CHUNK_SIZE").then(|| "many".to_string())
    })
    .unwrap_err();
    assert!(err.to_string().contains("CHUNK_SIZE"));
}
