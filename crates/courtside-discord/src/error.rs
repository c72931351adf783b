//! Error types for the Discord client.

use thiserror::Error;

/// Errors that can occur when talking to Discord.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// Bot token rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Message or channel does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The bot lacks permission for this resource (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying, from the response body or `Retry-After`.
        retry_after_secs: Option<u64>,
    },

    /// Other non-success response.
    #[error("Discord API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Gateway connection lost or refused.
    #[error("connection error: {0}")]
    Connection(String),

    /// Response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl DiscordError {
    /// True when the remote message is gone or unusable and should be replaced.
    pub fn is_missing_message(&self) -> bool {
        matches!(self, DiscordError::NotFound(_) | DiscordError::Forbidden(_))
    }

    /// True for connection-level failures (DNS, refused, reset, gateway closed).
    pub fn is_connection(&self) -> bool {
        match self {
            DiscordError::Connection(_) => true,
            DiscordError::Http(e) => e.is_connect(),
            _ => false,
        }
    }
}
