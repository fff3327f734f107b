//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use quota_batch_scheduler::builders::SchedulerBuilder;
use quota_batch_scheduler::config::SchedulerConfig;
use quota_batch_scheduler::core::{
    AuditAction, BatchExecutor, BatchItem, BatchMetadata, BatchResponse, InMemoryAuditSink,
    SchedulerError, ServiceError,
};
use quota_batch_scheduler::runtime::TokioSpawner;
use quota_batch_scheduler::util::clock::ManualClock;

#[derive(Clone)]
struct EchoService;

#[async_trait]
impl BatchExecutor<u32, u32> for EchoService {
    async fn execute(
        &self,
        items: Vec<BatchItem<u32>>,
        _meta: BatchMetadata,
    ) -> Result<BatchResponse<u32>, ServiceError> {
        Ok(items.into_iter().map(|item| (item.key, item.payload * 2)).collect())
    }
}

#[test]
fn test_builder_keeps_config() {
    let config = SchedulerConfig {
        max_batch_size: 4,
        ..SchedulerConfig::default()
    };
    let builder = SchedulerBuilder::<u32, u32, _>::new(config, EchoService);
    assert_eq!(builder.config().max_batch_size, 4);
}

#[test]
fn test_build_requires_runtime() {
    let result = SchedulerBuilder::<u32, u32, _>::new(SchedulerConfig::default(), EchoService).build();
    assert!(matches!(result, Err(SchedulerError::Backend(_))));
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let config = SchedulerConfig {
        chunk_size: 0,
        ..SchedulerConfig::default()
    };
    let result = SchedulerBuilder::<u32, u32, _>::new(config, EchoService).build();
    assert!(matches!(result, Err(SchedulerError::Backend(_))));
}

#[tokio::test(start_paused = true)]
async fn test_build_with_explicit_spawner() {
    let audit = InMemoryAuditSink::new(16);
    let scheduler = SchedulerBuilder::new(SchedulerConfig::default(), EchoService)
        .with_clock(Arc::new(ManualClock::new()))
        .with_audit(audit.clone())
        .build_with(TokioSpawner::new(tokio::runtime::Handle::current()))
        .unwrap();

    assert_eq!(scheduler.request("double", 21).await, Ok(42));
    assert_eq!(audit.count(AuditAction::Publish), 1);
}
