//! Error types for the Sheets client.

use courtside_roster::FetchError;
use thiserror::Error;

/// Errors that can occur when reading the sign-up sheet.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// Service account credentials could not be parsed or used.
    #[error("invalid credentials: {0}")]
    Credentials(String),

    /// Token exchange failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success response from the Sheets API.
    #[error("Sheets API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Rate limited by the Sheets API.
    #[error("rate limited by Sheets API")]
    RateLimited,

    /// A required header is missing from the first row.
    #[error("missing column: {0}")]
    MissingColumn(String),
}

impl From<SheetsError> for FetchError {
    fn from(err: SheetsError) -> Self {
        match err {
            SheetsError::Http(ref e) if e.is_timeout() => {
                FetchError::Unreachable(format!("request timed out: {e}"))
            }
            SheetsError::Credentials(_) | SheetsError::Json(_) | SheetsError::MissingColumn(_) => {
                FetchError::Malformed(err.to_string())
            }
            SheetsError::Auth(_)
            | SheetsError::Http(_)
            | SheetsError::Api { .. }
            | SheetsError::RateLimited => FetchError::Unreachable(err.to_string()),
        }
    }
}
