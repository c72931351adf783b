//! Discord payload types.

use serde::{Deserialize, Serialize};

/// Application command option type for strings.
const OPTION_STRING: u8 = 3;

/// Chat-input (slash) command type.
const COMMAND_CHAT_INPUT: u8 = 1;

/// Administrator permission bit, as a string the API expects.
const ADMINISTRATOR: &str = "8";

/// Interaction response flag for "only the invoking user can see this".
pub(crate) const EPHEMERAL: u64 = 1 << 6;

/// The authenticated bot user.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// A message read back from channel history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentMessage {
    pub id: String,
    pub author_id: String,
    pub content: String,
}

/// A slash command invocation received over the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub interaction_id: String,
    /// Interaction token, valid for 15 minutes.
    pub token: String,
    pub name: String,
    /// String options as (name, value) pairs.
    pub options: Vec<(String, String)>,
    pub user_id: String,
    /// Guild nickname, then global name, then username.
    pub display_name: String,
}

impl CommandInvocation {
    /// Value of a string option, if provided.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Mention markup for the invoking user.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

/// A slash command definition for bulk registration.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOptionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_member_permissions: Option<String>,
}

impl CommandSpec {
    /// A command anyone can run.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: COMMAND_CHAT_INPUT,
            options: Vec::new(),
            default_member_permissions: None,
        }
    }

    /// Restrict the command to administrators by default.
    pub fn admin_only(mut self) -> Self {
        self.default_member_permissions = Some(ADMINISTRATOR.to_string());
        self
    }

    /// Add a string option.
    pub fn string_option(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.options.push(CommandOptionSpec {
            kind: OPTION_STRING,
            name: name.into(),
            description: description.into(),
            required,
            max_length: None,
        });
        self
    }

    /// Cap the length of the most recently added string option.
    pub fn max_length(mut self, max: usize) -> Self {
        if let Some(option) = self.options.last_mut() {
            option.max_length = Some(max);
        }
        self
    }
}

/// A command option definition.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOptionSpec {
    #[serde(rename = "type")]
    kind: u8,
    pub name: String,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// How to answer an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionReply {
    /// Answer now, visible only to the invoking user.
    Ephemeral(String),
    /// Acknowledge now and fill in the answer later via the webhook.
    DeferEphemeral,
}
