//! Roster types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Number of confirmed spots per session.
pub const CAPACITY: usize = 21;

/// A raw row from the sign-up sheet, before any date filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// Value of the name column.
    pub name: String,
    /// Value of the participation date column, verbatim.
    pub participation_date: String,
}

impl SheetRow {
    pub fn new(name: impl Into<String>, participation_date: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            participation_date: participation_date.into(),
        }
    }
}

/// A sign-up for one session date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUp {
    pub name: String,
    pub participation_date: NaiveDate,
}

/// The confirmed/waitlist split of the sign-ups for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    /// Session date (the week anchor the roster was fetched for).
    pub date: NaiveDate,
    /// Maximum number of confirmed players.
    pub capacity: usize,
    /// The first `capacity` sign-ups, in sign-up order.
    pub confirmed: Vec<SignUp>,
    /// Everyone after the first `capacity`, in sign-up order.
    pub waitlist: Vec<SignUp>,
}

impl Roster {
    /// Split sign-ups into confirmed and waitlist, preserving order.
    pub fn partition(date: NaiveDate, mut signups: Vec<SignUp>, capacity: usize) -> Self {
        let waitlist = if signups.len() > capacity {
            signups.split_off(capacity)
        } else {
            Vec::new()
        };

        Self {
            date,
            capacity,
            confirmed: signups,
            waitlist,
        }
    }

    /// An empty roster for the given date.
    pub fn empty(date: NaiveDate) -> Self {
        Self::partition(date, Vec::new(), CAPACITY)
    }

    /// Total number of sign-ups across both lists.
    pub fn len(&self) -> usize {
        self.confirmed.len() + self.waitlist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cancellation state for one week.
///
/// Stored by the sync engine and only meaningful while `week_anchor` matches
/// the current upcoming Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRecord {
    /// The Sunday this record applies to.
    pub week_anchor: NaiveDate,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Display name of the admin who issued the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CancellationRecord {
    /// Reason text, falling back to the default phrase when none was given.
    pub fn reason_or_default(&self) -> &str {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(crate::render::DEFAULT_REASON)
    }
}
