//! Roster fetching over a row source.

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::week::sheet_date_forms;
use crate::{FetchError, Roster, SheetRow, SignUp};

/// Source of raw sign-up rows (the spreadsheet).
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// All rows of the sign-up sheet, in sheet order.
    async fn list_rows(&self) -> Result<Vec<SheetRow>, FetchError>;
}

/// Keep the rows whose participation date is exactly `target`, in sheet order.
pub fn select_signups(rows: Vec<SheetRow>, target: NaiveDate) -> Vec<SignUp> {
    let forms = sheet_date_forms(target);

    rows.into_iter()
        .filter(|row| {
            let cell = row.participation_date.trim();
            forms.iter().any(|form| form == cell)
        })
        .map(|row| SignUp {
            name: row.name.trim().to_string(),
            participation_date: target,
        })
        .collect()
}

/// Pull all rows from `source` and build the roster for `target`.
#[tracing::instrument(skip(source))]
pub async fn fetch_roster(
    source: &dyn RosterSource,
    target: NaiveDate,
    capacity: usize,
) -> Result<Roster, FetchError> {
    let rows = source.list_rows().await?;
    let total_rows = rows.len();
    let signups = select_signups(rows, target);

    debug!(total_rows, matched = signups.len(), "filtered sheet rows");

    Ok(Roster::partition(target, signups, capacity))
}
