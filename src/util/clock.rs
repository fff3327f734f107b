//! Time sources used by the scheduler.
//!
//! Monotonic instants come from `tokio::time`, so a paused tokio runtime
//! drives every timer and quota window in tests. Calendar days are derived
//! separately because the daily quota resets on a wall-clock boundary.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::time::Instant;

/// Length of a calendar day in seconds.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Source of monotonic time and calendar-day boundaries.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant.
    fn now(&self) -> Instant;
    /// Index of the current calendar day.
    fn day(&self) -> u64;
    /// Time remaining until the next calendar day begins.
    fn until_next_day(&self) -> Duration;
}

/// Clock backed by the tokio instant and the system wall clock (UTC days).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn day(&self) -> u64 {
        since_epoch().as_secs() / SECONDS_PER_DAY
    }

    fn until_next_day(&self) -> Duration {
        until_boundary(since_epoch())
    }
}

fn until_boundary(since_day_zero: Duration) -> Duration {
    let next_day = since_day_zero.as_secs() / SECONDS_PER_DAY + 1;
    Duration::from_secs(next_day * SECONDS_PER_DAY).saturating_sub(since_day_zero)
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    start_of_day: Duration,
}

/// Manually advanced clock for deterministic tests.
///
/// Cloned handles share the same time, so a test can keep one handle and pass
/// another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Clock starting at the beginning of day zero.
    pub fn new() -> Self {
        Self::starting_at(Duration::ZERO)
    }

    /// Clock starting `time_of_day` after the beginning of day zero.
    pub fn starting_at(time_of_day: Duration) -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                start_of_day: time_of_day,
            })),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.state.lock().elapsed += by;
    }

    fn since_day_zero(&self) -> Duration {
        let state = self.state.lock();
        state.start_of_day + state.elapsed
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    fn day(&self) -> u64 {
        self.since_day_zero().as_secs() / SECONDS_PER_DAY
    }

    fn until_next_day(&self) -> Duration {
        until_boundary(self.since_day_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_rolls_over_days() {
        let clock = ManualClock::starting_at(Duration::from_secs(SECONDS_PER_DAY - 10));
        assert_eq!(clock.day(), 0);
        assert_eq!(clock.until_next_day(), Duration::from_secs(10));

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.day(), 1);
        assert_eq!(clock.until_next_day(), Duration::from_secs(SECONDS_PER_DAY));
    }

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let start = other.now();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(other.now() - start, Duration::from_millis(1500));
    }
}
