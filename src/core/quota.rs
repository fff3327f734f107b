//! Admission control against the provider's per-minute and per-day limits.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::util::clock::Clock;

/// Length of the rolling admission window.
pub const QUOTA_WINDOW: Duration = Duration::from_secs(60);

/// Configured admission ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Units admitted in any rolling 60 second window.
    pub per_minute: u32,
    /// Units admitted per calendar day.
    pub per_day: u32,
}

/// Point-in-time view of quota consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Units consumed in the current rolling window.
    pub in_window: u32,
    /// Units consumed today.
    pub today: u32,
    /// Configured limits.
    pub limits: QuotaLimits,
}

/// Rolling-minute and daily consumption counters.
///
/// The minute window keeps one entry per admission and evicts entries by
/// exact elapsed time, so a burst at the end of one minute cannot be followed
/// by a second full burst at the start of the next.
pub struct QuotaTracker {
    limits: QuotaLimits,
    clock: Arc<dyn Clock>,
    window: VecDeque<(Instant, u32)>,
    in_window: u32,
    day: u64,
    today: u32,
}

impl QuotaTracker {
    /// Create a tracker with empty counters for the clock's current day.
    pub fn new(limits: QuotaLimits, clock: Arc<dyn Clock>) -> Self {
        let day = clock.day();
        Self {
            limits,
            clock,
            window: VecDeque::new(),
            in_window: 0,
            day,
            today: 0,
        }
    }

    /// Configured limits.
    pub const fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Consume `cost` units if both counters have room.
    ///
    /// Returns `false` without consuming anything when either limit would be
    /// exceeded.
    pub fn try_admit(&mut self, cost: u32) -> bool {
        let now = self.clock.now();
        let day = self.clock.day();
        self.try_admit_at(cost, now, day)
    }

    /// [`try_admit`](Self::try_admit) against an explicit instant and day.
    pub fn try_admit_at(&mut self, cost: u32, now: Instant, day: u64) -> bool {
        self.roll(now, day);
        if !self.fits(cost) {
            tracing::debug!(
                in_window = self.in_window,
                today = self.today,
                cost,
                "quota admission refused"
            );
            return false;
        }
        if cost > 0 {
            self.window.push_back((now, cost));
            self.in_window += cost;
            self.today += cost;
        }
        true
    }

    /// Time until `cost` units would be admitted, or zero if they fit now.
    ///
    /// A cost larger than a limit never fits; the delay then reflects the
    /// next point at which the counters change.
    pub fn admission_delay(&mut self, cost: u32) -> Duration {
        let now = self.clock.now();
        let day = self.clock.day();
        self.roll(now, day);

        if self.today.saturating_add(cost) > self.limits.per_day {
            return self.clock.until_next_day();
        }
        if self.in_window.saturating_add(cost) <= self.limits.per_minute {
            return Duration::ZERO;
        }

        let mut remaining = self.in_window;
        for &(at, units) in &self.window {
            remaining -= units;
            if remaining.saturating_add(cost) <= self.limits.per_minute {
                return (at + QUOTA_WINDOW).saturating_duration_since(now);
            }
        }
        self.window
            .back()
            .map_or(QUOTA_WINDOW, |&(at, _)| (at + QUOTA_WINDOW).saturating_duration_since(now))
    }

    /// Current consumption, after evicting expired window entries.
    pub fn snapshot(&mut self) -> QuotaSnapshot {
        let now = self.clock.now();
        let day = self.clock.day();
        self.roll(now, day);
        QuotaSnapshot {
            in_window: self.in_window,
            today: self.today,
            limits: self.limits,
        }
    }

    fn fits(&self, cost: u32) -> bool {
        self.in_window.saturating_add(cost) <= self.limits.per_minute
            && self.today.saturating_add(cost) <= self.limits.per_day
    }

    fn roll(&mut self, now: Instant, day: u64) {
        while let Some(&(at, units)) = self.window.front() {
            if now.saturating_duration_since(at) < QUOTA_WINDOW {
                break;
            }
            self.window.pop_front();
            self.in_window -= units;
        }
        if day > self.day {
            tracing::info!(day, consumed = self.today, "daily quota reset");
            self.day = day;
            self.today = 0;
        }
    }
}
