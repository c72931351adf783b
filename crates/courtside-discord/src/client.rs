//! Discord REST client (API v10).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::types::EPHEMERAL;
use crate::{
    ChatPlatform, CommandInvocation, CommandSpec, CurrentUser, DiscordError, InteractionReply,
    RecentMessage,
};

/// Production REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const USER_AGENT: &str = concat!("DiscordBot (courtside, ", env!("CARGO_PKG_VERSION"), ")");

/// Client for the Discord REST API, authenticated as a bot.
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: SecretString,
    bot_user_id: String,
}

impl DiscordClient {
    /// Authenticate with the bot token and resolve the bot's own user id.
    ///
    /// The `/users/@me` call doubles as a startup connectivity check: a bad
    /// token surfaces as [`DiscordError::Auth`] here rather than on first edit.
    pub async fn connect(
        token: SecretString,
        api_base: impl Into<String>,
    ) -> Result<Self, DiscordError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        let mut client = Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            bot_user_id: String::new(),
        };

        let me = client.current_user().await?;
        info!(user_id = %me.id, username = %me.username, "authenticated with Discord");
        client.bot_user_id = me.id;

        Ok(client)
    }

    pub(crate) fn token(&self) -> &SecretString {
        &self.token
    }

    /// Application id for command registration. Equal to the bot user id.
    pub fn application_id(&self) -> &str {
        &self.bot_user_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header(
                "Authorization",
                format!("Bot {}", self.token.expose_secret()),
            )
    }

    /// Fetch the authenticated bot user.
    pub async fn current_user(&self) -> Result<CurrentUser, DiscordError> {
        let response = self.request(Method::GET, "/users/@me").send().await?;
        handle_json(response).await
    }

    /// Websocket URL for the gateway.
    pub async fn gateway_url(&self) -> Result<String, DiscordError> {
        #[derive(Deserialize)]
        struct GatewayBot {
            url: String,
        }

        let response = self.request(Method::GET, "/gateway/bot").send().await?;
        let gateway: GatewayBot = handle_json(response).await?;
        Ok(gateway.url)
    }

    /// Replace the bot's global slash commands with `commands`.
    #[tracing::instrument(skip(self, commands), fields(count = commands.len()))]
    pub async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), DiscordError> {
        let path = format!("/applications/{}/commands", self.application_id());
        let response = self.request(Method::PUT, &path).json(commands).send().await?;
        handle_empty(response).await?;
        info!("registered slash commands");
        Ok(())
    }

    /// Send the initial response to an interaction.
    pub async fn respond(
        &self,
        invocation: &CommandInvocation,
        reply: InteractionReply,
    ) -> Result<(), DiscordError> {
        let body = match reply {
            InteractionReply::Ephemeral(content) => json!({
                "type": 4,
                "data": {
                    "content": content,
                    "flags": EPHEMERAL,
                    "allowed_mentions": { "parse": [] },
                },
            }),
            InteractionReply::DeferEphemeral => json!({
                "type": 5,
                "data": { "flags": EPHEMERAL },
            }),
        };

        let path = format!(
            "/interactions/{}/{}/callback",
            invocation.interaction_id, invocation.token
        );
        let response = self.request(Method::POST, &path).json(&body).send().await?;
        handle_empty(response).await
    }

    /// Fill in a deferred interaction response.
    pub async fn edit_original_response(
        &self,
        invocation: &CommandInvocation,
        content: &str,
    ) -> Result<(), DiscordError> {
        let path = format!(
            "/webhooks/{}/{}/messages/@original",
            self.application_id(),
            invocation.token
        );
        let response = self
            .request(Method::PATCH, &path)
            .json(&json!({ "content": content, "allowed_mentions": { "parse": [] } }))
            .send()
            .await?;
        handle_empty(response).await
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    async fn send(&self, channel_id: &str, content: &str) -> Result<String, DiscordError> {
        #[derive(Deserialize)]
        struct Created {
            id: String,
        }

        let path = format!("/channels/{}/messages", channel_id);
        let response = self
            .request(Method::POST, &path)
            .json(&json!({ "content": content, "allowed_mentions": { "parse": [] } }))
            .send()
            .await?;
        let created: Created = handle_json(response).await?;
        debug!(message_id = %created.id, "message posted");
        Ok(created.id)
    }

    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), DiscordError> {
        let path = format!("/channels/{}/messages/{}", channel_id, message_id);
        let response = self
            .request(Method::PATCH, &path)
            .json(&json!({ "content": content, "allowed_mentions": { "parse": [] } }))
            .send()
            .await?;
        handle_empty(response).await
    }

    async fn fetch_recent(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<RecentMessage>, DiscordError> {
        #[derive(Deserialize)]
        struct Author {
            id: String,
        }

        #[derive(Deserialize)]
        struct Message {
            id: String,
            #[serde(default)]
            content: String,
            author: Author,
        }

        let limit = limit.clamp(1, 100);
        let path = format!("/channels/{}/messages?limit={}", channel_id, limit);
        let response = self.request(Method::GET, &path).send().await?;
        let messages: Vec<Message> = handle_json(response).await?;

        Ok(messages
            .into_iter()
            .map(|m| RecentMessage {
                id: m.id,
                author_id: m.author.id,
                content: m.content,
            })
            .collect())
    }
}

async fn handle_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DiscordError> {
    let response = check_status(response).await?;
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

async fn handle_empty(response: reqwest::Response) -> Result<(), DiscordError> {
    check_status(response).await.map(|_| ())
}

/// Map non-success statuses onto [`DiscordError`] variants.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DiscordError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let header_retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok());

    let text = response.text().await.map_err(|e| {
        DiscordError::InvalidResponse(format!(
            "request failed ({}): failed to read response: {}",
            status, e
        ))
    })?;

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            #[derive(Deserialize)]
            struct RateLimitBody {
                retry_after: f64,
            }

            let retry_after = serde_json::from_str::<RateLimitBody>(&text)
                .ok()
                .map(|b| b.retry_after)
                .or(header_retry_after);
            let retry_after_secs = retry_after.map(|secs| secs.max(0.0).ceil() as u64);
            warn!(?retry_after_secs, "Discord rate limited");
            Err(DiscordError::RateLimited { retry_after_secs })
        }
        StatusCode::UNAUTHORIZED => Err(DiscordError::Auth(text)),
        StatusCode::NOT_FOUND => Err(DiscordError::NotFound(text)),
        StatusCode::FORBIDDEN => Err(DiscordError::Forbidden(text)),
        _ => Err(DiscordError::Api {
            status: status.as_u16(),
            body: text,
        }),
    }
}
