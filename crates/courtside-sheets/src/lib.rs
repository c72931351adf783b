//! Google Sheets client for the Courtside sign-up roster.
//!
//! Reads the form-response tab with the Sheets v4 `values` endpoint,
//! authenticating as a service account (JWT bearer grant), and exposes the
//! rows through [`courtside_roster::RosterSource`].

mod auth;
mod client;
mod error;

pub use auth::{ServiceAccountAuth, ServiceAccountKey};
pub use client::{ColumnNames, DEFAULT_TAB, SheetsClient, rows_from_values};
pub use error::SheetsError;
