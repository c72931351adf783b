//! Week anchor math.
//!
//! Every piece of weekly state is keyed by the upcoming Sunday. On a Sunday
//! the anchor is that same day, so the roster stays up through the session.

use chrono::{Datelike, Duration, NaiveDate};

/// The upcoming Sunday, or `today` itself when it is a Sunday.
pub fn next_sunday(today: NaiveDate) -> NaiveDate {
    let days_ahead = (7 - today.weekday().num_days_from_sunday()) % 7;
    today + Duration::days(i64::from(days_ahead))
}

/// The textual forms a sheet cell may use for `date`: `M/D/YYYY` and `MM/DD/YYYY`.
pub fn sheet_date_forms(date: NaiveDate) -> [String; 2] {
    [
        format!("{}/{}/{}", date.month(), date.day(), date.year()),
        date.format("%m/%d/%Y").to_string(),
    ]
}
