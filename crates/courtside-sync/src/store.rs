//! File-backed state: the week's cancellation and the anchored message ids.
//!
//! Both stores load once at startup and rewrite their whole file on every
//! mutation (temp file, fsync, rename), so a crash never leaves a torn file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use courtside_roster::{CancellationRecord, next_sunday};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{Clock, StoreError};

/// Which of the bot's messages a piece of state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Announcements,
    Roster,
}

impl ChannelRole {
    pub const ALL: [ChannelRole; 2] = [ChannelRole::Announcements, ChannelRole::Roster];
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRole::Announcements => f.write_str("announcements"),
            ChannelRole::Roster => f.write_str("roster"),
        }
    }
}

/// The single long-lived message the bot edits for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAnchor {
    pub channel_id: String,
    pub message_id: String,
    /// Exactly what the message was last set to.
    pub last_rendered_text: String,
}

async fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !fs::try_exists(path).await? {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(value)?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;

    fs::rename(&temp_path, path).await?;
    debug!(path = %path.display(), "state written");
    Ok(())
}

/// The cancellation state for the current week.
#[derive(Debug)]
pub struct CancellationStore {
    path: PathBuf,
    record: Option<CancellationRecord>,
}

impl CancellationStore {
    /// Load from `path`; a missing file means nothing is cancelled.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let record = load_json(&path).await?;
        Ok(Self { path, record })
    }

    /// The record for the upcoming Sunday as seen by `clock`, if any.
    pub fn get_current(&self, clock: &dyn Clock) -> Option<&CancellationRecord> {
        self.get_current_at(next_sunday(clock.today()))
    }

    /// The record for `anchor`. A record for any other week reads as absent.
    pub fn get_current_at(&self, anchor: NaiveDate) -> Option<&CancellationRecord> {
        self.record.as_ref().filter(|r| r.week_anchor == anchor)
    }

    /// Whether the week of `anchor` is cancelled.
    pub fn is_cancelled(&self, anchor: NaiveDate) -> bool {
        self.get_current_at(anchor).is_some_and(|r| r.cancelled)
    }

    /// Cancel the week of `anchor` and persist.
    pub async fn set(
        &mut self,
        anchor: NaiveDate,
        reason: Option<String>,
        cancelled_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&CancellationRecord, StoreError> {
        let record = CancellationRecord {
            week_anchor: anchor,
            cancelled: true,
            reason,
            cancelled_by,
            updated_at: now,
        };
        self.replace(record).await
    }

    /// Mark the week of `anchor` as not cancelled and persist.
    pub async fn clear(
        &mut self,
        anchor: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<&CancellationRecord, StoreError> {
        let record = CancellationRecord {
            week_anchor: anchor,
            cancelled: false,
            reason: None,
            cancelled_by: None,
            updated_at: now,
        };
        self.replace(record).await
    }

    async fn replace(
        &mut self,
        record: CancellationRecord,
    ) -> Result<&CancellationRecord, StoreError> {
        write_atomic(&self.path, &record).await?;
        Ok(self.record.insert(record))
    }
}

/// Message anchors keyed by role.
#[derive(Debug)]
pub struct AnchorStore {
    path: PathBuf,
    anchors: BTreeMap<ChannelRole, MessageAnchor>,
}

impl AnchorStore {
    /// Load from `path`; a missing file means no anchors yet.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let anchors = load_json(&path).await?;
        Ok(Self { path, anchors })
    }

    /// The anchor for `role` if it points into `channel_id`.
    ///
    /// An anchor recorded for a different channel is stale configuration and
    /// reads as absent.
    pub fn get(&self, role: ChannelRole, channel_id: &str) -> Option<&MessageAnchor> {
        self.anchors
            .get(&role)
            .filter(|a| a.channel_id == channel_id)
    }

    /// Message ids currently anchored, across all roles.
    pub fn message_ids(&self) -> impl Iterator<Item = &str> {
        self.anchors.values().map(|a| a.message_id.as_str())
    }

    /// Record `anchor` for `role` and persist.
    pub async fn set(&mut self, role: ChannelRole, anchor: MessageAnchor) -> Result<(), StoreError> {
        let mut next = self.anchors.clone();
        next.insert(role, anchor);
        write_atomic(&self.path, &next).await?;
        self.anchors = next;
        Ok(())
    }
}
