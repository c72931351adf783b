//! Admin slash commands.

use courtside_discord::{CommandInvocation, CommandSpec};
use courtside_roster::{DEFAULT_REASON, MAX_REASON_CHARS, clip_reason};
use tracing::{info, warn};

use crate::{CommandReport, CycleReport, SyncEngine, SyncError};

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Cancel { reason: Option<String> },
    Uncancel,
    Roster,
    Version,
}

impl Command {
    /// Parse an invocation; `None` for commands this bot does not own.
    pub fn from_invocation(invocation: &CommandInvocation) -> Option<Self> {
        match invocation.name.as_str() {
            "cancel" => Some(Command::Cancel {
                reason: invocation.option("reason").map(str::to_string),
            }),
            "uncancel" => Some(Command::Uncancel),
            "roster" => Some(Command::Roster),
            "version" => Some(Command::Version),
            _ => None,
        }
    }

    /// Whether the reply needs a full sync and should be deferred.
    pub fn is_slow(&self) -> bool {
        !matches!(self, Command::Version)
    }
}

/// Definitions registered with Discord at startup.
pub fn command_specs() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("cancel", "Cancel this Sunday's volleyball session")
            .admin_only()
            .string_option("reason", "Why the session is cancelled", false)
            .max_length(MAX_REASON_CHARS),
        CommandSpec::new("uncancel", "Reinstate this Sunday's volleyball session").admin_only(),
        CommandSpec::new("roster", "Refresh the roster messages now").admin_only(),
        CommandSpec::new("version", "Show the bot version"),
    ]
}

pub fn version_text() -> String {
    format!("courtside v{}", env!("CARGO_PKG_VERSION"))
}

/// Run a command and produce the ephemeral reply text.
#[tracing::instrument(skip_all, fields(command = ?command, user = %invocation.user_id))]
pub async fn handle_command(
    engine: &SyncEngine,
    command: Command,
    invocation: &CommandInvocation,
) -> String {
    match command {
        Command::Version => version_text(),
        Command::Roster => match engine.run_cycle().await {
            Ok(report) => {
                info!(writes = report.writes(), "roster refreshed by command");
                refreshed_text(&report)
            }
            Err(e) => failure_text("refresh the roster", &e),
        },
        Command::Cancel { reason } => {
            let shown = reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(clip_reason)
                .unwrap_or_else(|| DEFAULT_REASON.to_string());
            match engine
                .cancel(reason, Some(invocation.display_name.clone()))
                .await
            {
                Ok(report) => cancel_text(&report, &shown),
                Err(e) => failure_text("cancel", &e),
            }
        }
        Command::Uncancel => match engine.uncancel().await {
            Ok(report) => uncancel_text(&report),
            Err(e) => failure_text("uncancel", &e),
        },
    }
}

fn refreshed_text(report: &CycleReport) -> String {
    let state = if report.writes() > 0 {
        "updated"
    } else {
        "already up to date"
    };
    format!(
        "🔄 Roster for {} {}: {} confirmed, {} waitlisted.",
        report.date.format("%B %d"),
        state,
        report.confirmed,
        report.waitlisted
    )
}

fn cancel_text(report: &CommandReport, reason: &str) -> String {
    let head = format!(
        "🛑 Sunday volleyball on {} is cancelled. Reason: {}",
        report.date.format("%B %d, %Y"),
        reason
    );
    with_sync_note(head, &report.sync)
}

fn uncancel_text(report: &CommandReport) -> String {
    let date = report.date.format("%B %d, %Y");
    let head = if report.changed {
        format!("✅ Sunday volleyball on {} is back on.", date)
    } else {
        format!("ℹ️ Sunday volleyball on {} was not cancelled.", date)
    };
    with_sync_note(head, &report.sync)
}

fn with_sync_note(head: String, sync: &Result<CycleReport, SyncError>) -> String {
    match sync {
        Ok(_) => head,
        Err(e) => {
            warn!(error = %e, "state saved but message update failed");
            format!(
                "{}\n⚠️ Saved, but updating the messages failed ({}). It will retry on the next cycle.",
                head, e
            )
        }
    }
}

fn failure_text(action: &str, error: &SyncError) -> String {
    warn!(error = %error, action, "command failed");
    format!("❌ Could not {}: {}", action, error)
}
