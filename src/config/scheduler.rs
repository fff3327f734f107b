//! Scheduler configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, QuotaLimits, RetryPolicy};

/// Tunables for quota admission, batching, retries and caching.
///
/// Every field has a default, so partial JSON documents and partial
/// environments are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Dispatches admitted in any rolling minute.
    pub minute_quota_limit: u32,
    /// Dispatches admitted per calendar day.
    pub daily_quota_limit: u32,
    /// Maximum items per external call.
    pub max_batch_size: usize,
    /// Maximum batches awaiting a response at once.
    pub chunk_size: usize,
    /// Pause between consecutive dispatches, and the minimum admission poll.
    pub delay_between_batches_ms: u64,
    /// Time allowed for one external call.
    pub request_timeout_ms: u64,
    /// Transient failures tolerated per item.
    pub max_retries: u32,
    /// Delay before retrying a transient failure.
    pub retry_delay_ms: u64,
    /// Delay before retrying a quota failure.
    pub quota_retry_delay_ms: u64,
    /// Quota failures tolerated per item.
    pub max_quota_retries: u32,
    /// Age after which cached values read as misses; `None` keeps them forever.
    pub cache_ttl_ms: Option<u64>,
    /// Maximum distinct keys outstanding at once.
    pub max_pending: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            minute_quota_limit: 30,
            daily_quota_limit: 200,
            max_batch_size: 15,
            chunk_size: 5,
            delay_between_batches_ms: 50,
            request_timeout_ms: 8000,
            max_retries: 3,
            retry_delay_ms: 1000,
            quota_retry_delay_ms: 30_000,
            max_quota_retries: 120,
            cache_ttl_ms: None,
            max_pending: 10_000,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.minute_quota_limit == 0 {
            return Err("minute_quota_limit must be greater than 0".into());
        }
        if self.daily_quota_limit == 0 {
            return Err("daily_quota_limit must be greater than 0".into());
        }
        if self.daily_quota_limit < self.minute_quota_limit {
            return Err("daily_quota_limit must be at least minute_quota_limit".into());
        }
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be greater than 0".into());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".into());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than 0".into());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be greater than 0".into());
        }
        if self.cache_ttl_ms == Some(0) {
            return Err("cache_ttl_ms must be greater than 0 when set".into());
        }
        if self.max_pending == 0 {
            return Err("max_pending must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment (and a `.env` file if
    /// present), starting from defaults.
    ///
    /// Recognized variables: `MINUTE_QUOTA_LIMIT`, `DAILY_QUOTA_LIMIT`,
    /// `MAX_BATCH_SIZE`, `CHUNK_SIZE`, `DELAY_BETWEEN_BATCHES`,
    /// `REQUEST_TIMEOUT`, `MAX_RETRIES`, `RETRY_DELAY`, `QUOTA_RETRY_DELAY`,
    /// `MAX_QUOTA_RETRIES`, `CACHE_TTL`, `MAX_PENDING`. Durations are in
    /// milliseconds.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup and validate.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        override_from(&lookup, "MINUTE_QUOTA_LIMIT", &mut cfg.minute_quota_limit)?;
        override_from(&lookup, "DAILY_QUOTA_LIMIT", &mut cfg.daily_quota_limit)?;
        override_from(&lookup, "MAX_BATCH_SIZE", &mut cfg.max_batch_size)?;
        override_from(&lookup, "CHUNK_SIZE", &mut cfg.chunk_size)?;
        override_from(&lookup, "DELAY_BETWEEN_BATCHES", &mut cfg.delay_between_batches_ms)?;
        override_from(&lookup, "REQUEST_TIMEOUT", &mut cfg.request_timeout_ms)?;
        override_from(&lookup, "MAX_RETRIES", &mut cfg.max_retries)?;
        override_from(&lookup, "RETRY_DELAY", &mut cfg.retry_delay_ms)?;
        override_from(&lookup, "QUOTA_RETRY_DELAY", &mut cfg.quota_retry_delay_ms)?;
        override_from(&lookup, "MAX_QUOTA_RETRIES", &mut cfg.max_quota_retries)?;
        override_from(&lookup, "MAX_PENDING", &mut cfg.max_pending)?;
        if let Some(raw) = lookup("CACHE_TTL") {
            cfg.cache_ttl_ms = Some(parse_var("CACHE_TTL", &raw)?);
        }
        cfg.validate().map_err(|e| anyhow!("invalid scheduler config: {e}"))?;
        Ok(cfg)
    }

    /// Quota ceilings.
    pub const fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            per_minute: self.minute_quota_limit,
            per_day: self.daily_quota_limit,
        }
    }

    /// Retry policy.
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_quota_retries: self.max_quota_retries,
            quota_retry_delay: Duration::from_millis(self.quota_retry_delay_ms),
        }
    }

    /// Pause between dispatches.
    pub const fn delay_between_batches(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }

    /// Time allowed for one external call.
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Cache ttl.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_ms.map(Duration::from_millis)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{name}={raw:?} is not valid: {e}"))
}

fn override_from<T, F>(lookup: &F, name: &str, target: &mut T) -> AppResult<()>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *target = parse_var(name, &raw)?;
    }
    Ok(())
}
