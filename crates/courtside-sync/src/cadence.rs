//! Wake interval policy.

use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

/// Sunday hour (local) at which the active window closes.
const SUNDAY_CUTOFF_HOUR: u32 = 17;

/// Short interval from Friday 00:00 through Sunday 17:00 local, long otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub active: Duration,
    pub idle: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            active: Duration::from_secs(60),
            idle: Duration::from_secs(240),
        }
    }
}

impl Cadence {
    pub fn new(active: Duration, idle: Duration) -> Self {
        Self { active, idle }
    }

    /// Whether `now` falls inside the weekend sign-up window.
    pub fn is_active(now: NaiveDateTime) -> bool {
        match now.weekday() {
            Weekday::Fri | Weekday::Sat => true,
            Weekday::Sun => now.time() < cutoff(),
            _ => false,
        }
    }

    /// How long to sleep after a cycle that finished at `now`.
    pub fn interval(&self, now: NaiveDateTime) -> Duration {
        if Self::is_active(now) {
            self.active
        } else {
            self.idle
        }
    }
}

fn cutoff() -> NaiveTime {
    NaiveTime::from_hms_opt(SUNDAY_CUTOFF_HOUR, 0, 0).unwrap_or(NaiveTime::MIN)
}
