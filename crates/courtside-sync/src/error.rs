//! Error types for the sync engine.

use std::time::Duration;

use courtside_discord::DiscordError;
use courtside_roster::FetchError;
use thiserror::Error;

/// Errors from the file-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a sync cycle or command did not complete.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The sign-up sheet could not be read.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A Discord call failed for a reason other than rate limiting.
    #[error("Discord update failed: {0}")]
    Edit(DiscordError),

    /// Discord rate limited us; wait `retry_after` before the next attempt.
    #[error("rate limited, backing off {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Local state could not be persisted.
    #[error("state store failed: {0}")]
    Store(#[from] StoreError),

    /// A remote call did not finish in time.
    #[error("{0} timed out")]
    Timeout(&'static str),
}
