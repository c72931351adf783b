use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

/// Source of the current time, so cycles can be driven from tests.
pub trait Clock: Send + Sync {
    /// Current UTC instant, for timestamps.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current local wall-clock time, for the week anchor and cadence.
    fn now_local(&self) -> NaiveDateTime;

    /// Current local date.
    fn today(&self) -> NaiveDate {
        self.now_local().date()
    }
}

/// The real clock in the process time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
