//! # Quota Batch Scheduler
//!
//! A quota-aware batch request scheduler with a shared pub-sub result cache.
//!
//! Many independent consumers ask for values keyed by a logical resource id.
//! The values come from an external service that accepts batched requests but
//! enforces a per-minute and a per-day call quota. The scheduler collapses
//! concurrent requests for the same key into one pending request, groups
//! pending keys into size-bounded batches, admits each batch against the
//! quota, retries failures according to their kind, and publishes every result
//! into a shared cache that fans out to subscribers.
//!
//! ## Key Features
//!
//! - **Quota admission**: rolling 60 second window plus a calendar-day
//!   counter; a batch is only dispatched when both have room
//! - **Coalescing**: N concurrent requests for one key cause one external call
//! - **Bounded batching**: at most `max_batch_size` keys per call, oldest first
//! - **Bounded concurrency**: at most `chunk_size` calls awaiting a response
//! - **Retries**: transient and quota failures retry with their own delays and
//!   limits; permanent failures surface immediately
//! - **Shared cache**: versioned immutable entries, optional ttl, subscriber
//!   callbacks that never run under the scheduler lock
//!
//! ## Example
//!
//! ```rust,ignore
//! use quota_batch_scheduler::builders::SchedulerBuilder;
//! use quota_batch_scheduler::config::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_env()?;
//! let scheduler = SchedulerBuilder::new(config, CandidateCounter::new(client)).build()?;
//!
//! let _updates = scheduler.subscribe("job-42", |entry| {
//!     tracing::info!(version = entry.version, "candidate count changed");
//! });
//! let count = scheduler.request("job-42", JobQuery::for_job(42)).await?;
//! scheduler.refresh("job-42");
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: quota, coalescing, batching, retries, cache.
pub mod core;
/// Configuration models for quotas, batching, retries and caching.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Infrastructure adapters for pending-pool storage.
pub mod infra;
/// Runtime adapters for spawning scheduler tasks.
pub mod runtime;
/// Shared utilities: clocks, identifiers and telemetry.
pub mod util;
