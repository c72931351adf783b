use async_trait::async_trait;

use crate::{DiscordError, RecentMessage};

/// The message operations the sync engine needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Id of the bot user, used to recognise its own messages in history.
    fn bot_user_id(&self) -> &str;

    /// Post a new message and return its id.
    async fn send(&self, channel_id: &str, content: &str) -> Result<String, DiscordError>;

    /// Replace the content of an existing message.
    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), DiscordError>;

    /// Most recent messages in a channel, newest first.
    async fn fetch_recent(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<RecentMessage>, DiscordError>;
}
