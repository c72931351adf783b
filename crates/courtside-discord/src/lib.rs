//! Discord client for Courtside.
//!
//! - **REST**: send, edit and list channel messages; register slash commands;
//!   answer interactions
//! - **Gateway**: websocket session that forwards slash-command invocations,
//!   reconnecting with a long randomized backoff
//! - **ChatPlatform**: the narrow message-store trait the sync engine uses,
//!   so it can run against an in-memory fake in tests

mod client;
mod error;
pub mod gateway;
mod platform;
mod types;

pub use client::{DEFAULT_API_BASE, DiscordClient};
pub use error::DiscordError;
pub use gateway::{Gateway, parse_interaction, reconnect_backoff};
pub use platform::ChatPlatform;
pub use types::{
    CommandInvocation, CommandOptionSpec, CommandSpec, CurrentUser, InteractionReply,
    RecentMessage,
};
