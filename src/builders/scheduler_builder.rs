//! Builder wiring configuration, executor, clock and audit sink into a
//! running [`Scheduler`].

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{
    AuditSink, BatchExecutor, RequestPayload, ResultValue, Scheduler, SchedulerError, Spawn,
};
use crate::infra::InMemoryPendingPool;
use crate::runtime::TokioSpawner;
use crate::util::clock::{Clock, SystemClock};

/// Builds a [`Scheduler`] backed by the in-memory pending pool.
pub struct SchedulerBuilder<P, V, E> {
    config: SchedulerConfig,
    executor: E,
    clock: Arc<dyn Clock>,
    audit: Option<Box<dyn AuditSink>>,
    _types: PhantomData<fn(P) -> V>,
}

impl<P, V, E> SchedulerBuilder<P, V, E>
where
    P: RequestPayload,
    V: ResultValue,
    E: BatchExecutor<P, V>,
{
    /// Start from `config` and the client for the external service.
    pub fn new(config: SchedulerConfig, executor: E) -> Self {
        Self {
            config,
            executor,
            clock: Arc::new(SystemClock),
            audit: None,
            _types: PhantomData,
        }
    }

    /// Configuration the scheduler will use.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record lifecycle events into `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    /// Build on the tokio runtime the caller is running on.
    pub fn build(self) -> Result<Scheduler<P, V, E>, SchedulerError> {
        let spawner = TokioSpawner::current()
            .ok_or_else(|| SchedulerError::Backend("no tokio runtime available".into()))?;
        self.build_with(spawner)
    }

    /// Build with an explicit spawner.
    pub fn build_with<S>(
        self,
        spawner: S,
    ) -> Result<Scheduler<P, V, E, S>, SchedulerError>
    where
        S: Spawn + Send + Sync + 'static,
    {
        let pool = InMemoryPendingPool::new(self.config.max_pending);
        Scheduler::new(
            self.config,
            self.executor,
            spawner,
            pool,
            self.clock,
            self.audit,
        )
    }
}
