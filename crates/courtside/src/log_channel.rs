//! Mirror of failure reports into a Discord channel.

use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use courtside_discord::ChatPlatform;
use courtside_roster::MESSAGE_LIMIT;
use tracing::warn;

/// A Discord channel that receives operational reports.
#[derive(Clone)]
pub struct LogChannel {
    platform: Arc<dyn ChatPlatform>,
    channel_id: String,
}

impl LogChannel {
    pub fn new(platform: Arc<dyn ChatPlatform>, channel_id: impl Into<String>) -> Self {
        Self {
            platform,
            channel_id: channel_id.into(),
        }
    }

    /// Post a report. Failures are logged and otherwise ignored.
    pub async fn report(&self, prefix: &str, at: DateTime<Utc>, message: impl Display) {
        let entry = format_entry(prefix, at, &message.to_string());
        if let Err(e) = self.platform.send(&self.channel_id, &entry).await {
            warn!(error = %e, channel_id = %self.channel_id, "failed to mirror report to log channel");
        }
    }
}

/// ``{prefix} `{timestamp}`: `{message}` ``, cut to fit one message.
pub fn format_entry(prefix: &str, at: DateTime<Utc>, message: &str) -> String {
    let head = format!("{} `{}`: `", prefix, at.format("%Y-%m-%d %H:%M:%S UTC"));
    let room = MESSAGE_LIMIT.saturating_sub(head.chars().count() + 1);

    let message = message.replace('`', "'");
    let body: String = if message.chars().count() > room {
        let mut cut: String = message.chars().take(room.saturating_sub(1)).collect();
        cut.push('…');
        cut
    } else {
        message
    };

    format!("{}{}`", head, body)
}
