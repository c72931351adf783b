//! The sync cycle.
//!
//! One cycle fetches the upcoming Sunday's roster, renders a text per channel
//! role, and edits each role's anchored message only when its text changed.
//! Scheduled cycles and admin commands share one `Mutex`, so at most one
//! fetch-to-write sequence is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use courtside_discord::{ChatPlatform, DiscordError};
use courtside_roster::render::{ANNOUNCEMENT_MARKER, ROSTER_MARKER};
use courtside_roster::{
    CAPACITY, CancellationRecord, Roster, RosterSource, clip_reason, fetch_roster, next_sunday,
    render_announcement, render_roster,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    AnchorStore, CancellationStore, ChannelRole, Clock, HeartbeatWriter, MessageAnchor,
    RateLimitBackoff, SyncError,
};

/// Channel ids and limits for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub announcements_channel_id: String,
    pub roster_channel_id: String,
    pub capacity: usize,
    /// Upper bound on any single remote call.
    pub remote_timeout: Duration,
    /// How many recent messages to scan when looking for a previous post.
    pub history_limit: u8,
}

impl EngineConfig {
    pub fn new(
        announcements_channel_id: impl Into<String>,
        roster_channel_id: impl Into<String>,
    ) -> Self {
        Self {
            announcements_channel_id: announcements_channel_id.into(),
            roster_channel_id: roster_channel_id.into(),
            capacity: CAPACITY,
            remote_timeout: Duration::from_secs(45),
            history_limit: 50,
        }
    }

    fn channel(&self, role: ChannelRole) -> &str {
        match role {
            ChannelRole::Announcements => &self.announcements_channel_id,
            ChannelRole::Roster => &self.roster_channel_id,
        }
    }
}

/// What happened to one role's message during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSync {
    /// Text unchanged, no remote write.
    Unchanged,
    /// A previous bot message was found in history and already matched.
    Adopted,
    /// The anchored message was edited.
    Edited,
    /// A new message was posted and anchored.
    Posted,
}

impl RoleSync {
    pub fn is_write(self) -> bool {
        matches!(self, RoleSync::Edited | RoleSync::Posted)
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub date: NaiveDate,
    pub confirmed: usize,
    pub waitlisted: usize,
    pub roles: Vec<(ChannelRole, RoleSync)>,
}

impl CycleReport {
    /// Number of remote writes the cycle made.
    pub fn writes(&self) -> usize {
        self.roles.iter().filter(|(_, s)| s.is_write()).count()
    }
}

/// Result of a state-changing admin command.
///
/// The state change itself succeeded; `sync` tells whether Discord caught up
/// in the same pass or will on a later cycle.
#[derive(Debug)]
pub struct CommandReport {
    pub date: NaiveDate,
    /// False when the command asked for the state that was already in effect.
    pub changed: bool,
    pub sync: Result<CycleReport, SyncError>,
}

struct SyncState {
    cancellations: CancellationStore,
    anchors: AnchorStore,
    backoff: RateLimitBackoff,
}

/// Runs sync cycles against a roster source and a chat platform.
pub struct SyncEngine {
    source: Arc<dyn RosterSource>,
    platform: Arc<dyn ChatPlatform>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    heartbeat: HeartbeatWriter,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn RosterSource>,
        platform: Arc<dyn ChatPlatform>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        cancellations: CancellationStore,
        anchors: AnchorStore,
        heartbeat: HeartbeatWriter,
    ) -> Self {
        Self {
            source,
            platform,
            clock,
            config,
            heartbeat,
            state: Mutex::new(SyncState {
                cancellations,
                anchors,
                backoff: RateLimitBackoff::default(),
            }),
        }
    }

    /// Swap the rate-limit policy.
    pub fn with_backoff(mut self, backoff: RateLimitBackoff) -> Self {
        self.state.get_mut().backoff = backoff;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The Sunday the current week's state is keyed by.
    pub fn week_anchor(&self) -> NaiveDate {
        next_sunday(self.clock.today())
    }

    /// Run one scheduled cycle.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let mut state = self.state.lock().await;
        let date = self.week_anchor();
        let roster = self.fetch(date).await?;
        self.publish(&mut state, &roster).await
    }

    /// Cancel the current week and update both messages.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        reason: Option<String>,
        cancelled_by: Option<String>,
    ) -> Result<CommandReport, SyncError> {
        let mut state = self.state.lock().await;
        let date = self.week_anchor();
        let roster = self.fetch(date).await?;

        let reason = reason
            .map(|r| clip_reason(r.trim()))
            .filter(|r| !r.is_empty());
        state
            .cancellations
            .set(date, reason, cancelled_by, self.clock.now_utc())
            .await?;
        info!(%date, "session cancelled");

        let sync = self.publish(&mut state, &roster).await;
        Ok(CommandReport {
            date,
            changed: true,
            sync,
        })
    }

    /// Lift the current week's cancellation and update both messages.
    #[tracing::instrument(skip(self))]
    pub async fn uncancel(&self) -> Result<CommandReport, SyncError> {
        let mut state = self.state.lock().await;
        let date = self.week_anchor();
        let roster = self.fetch(date).await?;

        let changed = state.cancellations.is_cancelled(date);
        if changed {
            state
                .cancellations
                .clear(date, self.clock.now_utc())
                .await?;
            info!(%date, "cancellation lifted");
        }

        let sync = self.publish(&mut state, &roster).await;
        Ok(CommandReport {
            date,
            changed,
            sync,
        })
    }

    /// The current week's cancellation record, if it is cancelled.
    pub async fn current_cancellation(&self) -> Option<CancellationRecord> {
        let state = self.state.lock().await;
        state
            .cancellations
            .get_current(self.clock.as_ref())
            .filter(|r| r.cancelled)
            .cloned()
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Roster, SyncError> {
        let roster = self
            .bounded(
                "roster fetch",
                fetch_roster(self.source.as_ref(), date, self.config.capacity),
            )
            .await??;
        debug!(
            %date,
            confirmed = roster.confirmed.len(),
            waitlisted = roster.waitlist.len(),
            "roster fetched"
        );
        Ok(roster)
    }

    async fn bounded<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, SyncError> {
        tokio::time::timeout(self.config.remote_timeout, fut)
            .await
            .map_err(|_| SyncError::Timeout(what))
    }

    /// Render and push both roles. Caller holds the gate.
    ///
    /// Each role is compared and written on its own; a failure in one does not
    /// skip the other. A rate limit stops the cycle since the cooldown covers
    /// every write. The heartbeat only beats when every role succeeded.
    async fn publish(
        &self,
        state: &mut SyncState,
        roster: &Roster,
    ) -> Result<CycleReport, SyncError> {
        let cancellation = state
            .cancellations
            .get_current_at(roster.date)
            .filter(|r| r.cancelled)
            .cloned();

        let mut roles = Vec::with_capacity(ChannelRole::ALL.len());
        let mut failure = None;
        for role in ChannelRole::ALL {
            let text = match role {
                ChannelRole::Announcements => render_announcement(roster, cancellation.as_ref()),
                ChannelRole::Roster => render_roster(roster, cancellation.as_ref()),
            };
            match self.sync_role(state, role, text).await {
                Ok(outcome) => roles.push((role, outcome)),
                Err(e @ SyncError::RateLimited { .. }) => return Err(e),
                Err(e) => {
                    warn!(%role, error = %e, "role sync failed");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        self.heartbeat.beat(self.clock.now_utc());

        let report = CycleReport {
            date: roster.date,
            confirmed: roster.confirmed.len(),
            waitlisted: roster.waitlist.len(),
            roles,
        };
        if report.writes() > 0 {
            info!(writes = report.writes(), date = %report.date, "messages updated");
        } else {
            debug!("no changes");
        }
        Ok(report)
    }

    #[tracing::instrument(skip_all, fields(%role))]
    async fn sync_role(
        &self,
        state: &mut SyncState,
        role: ChannelRole,
        text: String,
    ) -> Result<RoleSync, SyncError> {
        let channel_id = self.config.channel(role).to_string();

        let existing = state.anchors.get(role, &channel_id).cloned();
        let (anchor, adopted) = match existing {
            Some(anchor) => (anchor, false),
            None => match self.find_previous(state, role, &channel_id).await? {
                Some(anchor) => {
                    info!(message_id = %anchor.message_id, "adopted previous message");
                    state.anchors.set(role, anchor.clone()).await?;
                    (anchor, true)
                }
                None => {
                    self.post_new(state, role, &channel_id, text).await?;
                    return Ok(RoleSync::Posted);
                }
            },
        };

        if anchor.last_rendered_text == text {
            return Ok(if adopted {
                RoleSync::Adopted
            } else {
                RoleSync::Unchanged
            });
        }

        let edit = self
            .bounded(
                "message edit",
                self.platform.edit(&channel_id, &anchor.message_id, &text),
            )
            .await?;

        match edit {
            Ok(()) => {
                state.backoff.reset();
                state
                    .anchors
                    .set(
                        role,
                        MessageAnchor {
                            last_rendered_text: text,
                            ..anchor
                        },
                    )
                    .await?;
                Ok(RoleSync::Edited)
            }
            Err(e) if e.is_missing_message() => {
                warn!(error = %e, message_id = %anchor.message_id, "anchored message unusable, posting a new one");
                self.post_new(state, role, &channel_id, text).await?;
                Ok(RoleSync::Posted)
            }
            Err(e) => Err(self.discord_failure(state, e)),
        }
    }

    /// Look for the bot's most recent message for `role` in channel history.
    async fn find_previous(
        &self,
        state: &mut SyncState,
        role: ChannelRole,
        channel_id: &str,
    ) -> Result<Option<MessageAnchor>, SyncError> {
        let recent = self
            .bounded(
                "history scan",
                self.platform
                    .fetch_recent(channel_id, self.config.history_limit),
            )
            .await?
            .map_err(|e| self.discord_failure(state, e))?;

        let bot_id = self.platform.bot_user_id();
        let taken: Vec<&str> = state.anchors.message_ids().collect();

        Ok(recent
            .into_iter()
            .find(|m| {
                m.author_id == bot_id
                    && !taken.contains(&m.id.as_str())
                    && role_matches(role, &m.content)
            })
            .map(|m| MessageAnchor {
                channel_id: channel_id.to_string(),
                message_id: m.id,
                last_rendered_text: m.content,
            }))
    }

    async fn post_new(
        &self,
        state: &mut SyncState,
        role: ChannelRole,
        channel_id: &str,
        text: String,
    ) -> Result<(), SyncError> {
        let message_id = self
            .bounded("message post", self.platform.send(channel_id, &text))
            .await?
            .map_err(|e| self.discord_failure(state, e))?;

        state.backoff.reset();
        info!(%message_id, "posted new message");
        state
            .anchors
            .set(
                role,
                MessageAnchor {
                    channel_id: channel_id.to_string(),
                    message_id,
                    last_rendered_text: text,
                },
            )
            .await?;
        Ok(())
    }

    fn discord_failure(&self, state: &mut SyncState, error: DiscordError) -> SyncError {
        match error {
            DiscordError::RateLimited { retry_after_secs } => {
                let retry_after = state
                    .backoff
                    .on_rate_limited(retry_after_secs.map(Duration::from_secs));
                SyncError::RateLimited { retry_after }
            }
            other => SyncError::Edit(other),
        }
    }
}

/// Whether a message body is this role's rendered text.
fn role_matches(role: ChannelRole, content: &str) -> bool {
    match role {
        ChannelRole::Roster => content.contains(ROSTER_MARKER),
        ChannelRole::Announcements => {
            content.contains(ANNOUNCEMENT_MARKER) && !content.contains(ROSTER_MARKER)
        }
    }
}
