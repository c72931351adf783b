//! Error types for roster fetching.

use thiserror::Error;

/// Errors that can occur while pulling sign-ups from the spreadsheet.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The spreadsheet could not be reached (network, auth, server error).
    #[error("spreadsheet unreachable: {0}")]
    Unreachable(String),

    /// The spreadsheet answered but its shape is wrong (missing columns, bad JSON).
    #[error("spreadsheet malformed: {0}")]
    Malformed(String),

    /// The fetch did not complete within its deadline.
    #[error("spreadsheet fetch timed out after {0}s")]
    Timeout(u64),
}
