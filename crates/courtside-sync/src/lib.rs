//! Keeps the Discord roster messages in step with the sign-up sheet.
//!
//! - **Store**: file-backed cancellation and message-anchor state
//! - **Cadence**: how long to sleep between cycles at a given local time
//! - **Backoff**: cooldown after Discord rate limits
//! - **Engine**: the fetch, render, diff and edit cycle behind a single-flight gate
//! - **Commands**: slash-command definitions and replies
//! - **Heartbeat**: last-success timestamp and staleness check

mod backoff;
mod cadence;
mod clock;
pub mod commands;
mod engine;
mod error;
mod heartbeat;
mod store;

pub use backoff::RateLimitBackoff;
pub use cadence::Cadence;
pub use clock::{Clock, SystemClock};
pub use commands::{Command, command_specs, handle_command};
pub use engine::{CommandReport, CycleReport, EngineConfig, RoleSync, SyncEngine};
pub use error::{StoreError, SyncError};
pub use heartbeat::{HealthStatus, HeartbeatReader, HeartbeatWriter, evaluate, heartbeat};
pub use store::{AnchorStore, CancellationStore, ChannelRole, MessageAnchor};
