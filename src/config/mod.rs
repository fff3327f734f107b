//! Configuration models for quotas, batching, retries and caching.

pub mod scheduler;

pub use scheduler::SchedulerConfig;
