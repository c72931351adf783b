#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use courtside_discord::{ChatPlatform, DiscordError, RecentMessage};
use courtside_roster::{FetchError, RosterSource, SheetRow};
use courtside_sync::{
    AnchorStore, CancellationStore, Clock, EngineConfig, HeartbeatReader, SyncEngine, heartbeat,
};

pub const BOT_ID: &str = "999";
pub const ANNOUNCEMENTS: &str = "100";
pub const ROSTER: &str = "200";

/// Sheet rows plus an optional failure for the next fetches.
#[derive(Default)]
pub struct FakeSheet {
    rows: Mutex<Vec<SheetRow>>,
    failure: Mutex<Option<FetchError>>,
}

impl FakeSheet {
    pub fn with_signups(date: &str, count: usize) -> Self {
        let sheet = Self::default();
        for i in 1..=count {
            sheet.push(&format!("Player {}", i), date);
        }
        sheet
    }

    pub fn push(&self, name: &str, date: &str) {
        self.rows.lock().unwrap().push(SheetRow::new(name, date));
    }

    pub fn fail_with(&self, error: Option<FetchError>) {
        *self.failure.lock().unwrap() = error;
    }
}

#[async_trait]
impl RosterSource for FakeSheet {
    async fn list_rows(&self) -> Result<Vec<SheetRow>, FetchError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
}

#[derive(Default)]
struct DiscordState {
    next_id: u64,
    messages: BTreeMap<u64, StoredMessage>,
    sends: usize,
    edits: usize,
    edit_failures: VecDeque<DiscordError>,
}

/// In-memory chat platform.
#[derive(Default)]
pub struct FakeDiscord {
    state: Mutex<DiscordState>,
}

impl FakeDiscord {
    /// Seed channel history with a message from `author_id`.
    pub fn seed(&self, channel_id: &str, author_id: &str, content: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.messages.insert(
            id,
            StoredMessage {
                channel_id: channel_id.into(),
                author_id: author_id.into(),
                content: content.into(),
            },
        );
        id.to_string()
    }

    pub fn delete(&self, message_id: &str) {
        let id: u64 = message_id.parse().unwrap();
        self.state.lock().unwrap().messages.remove(&id);
    }

    /// Make the next edits fail, in order.
    pub fn fail_next_edits(&self, errors: Vec<DiscordError>) {
        self.state.lock().unwrap().edit_failures.extend(errors);
    }

    pub fn sends(&self) -> usize {
        self.state.lock().unwrap().sends
    }

    pub fn edits(&self) -> usize {
        self.state.lock().unwrap().edits
    }

    pub fn writes(&self) -> usize {
        self.sends() + self.edits()
    }

    /// Messages the bot authored in `channel_id`, oldest first.
    pub fn bot_messages(&self, channel_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id && m.author_id == BOT_ID)
            .map(|m| m.content.clone())
            .collect()
    }

    /// Ids of the bot's messages in `channel_id`, oldest first.
    pub fn bot_message_ids(&self, channel_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|(_, m)| m.channel_id == channel_id && m.author_id == BOT_ID)
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// Content of the single bot message in `channel_id`.
    pub fn only_bot_message(&self, channel_id: &str) -> String {
        let messages = self.bot_messages(channel_id);
        assert_eq!(messages.len(), 1, "expected exactly one bot message in {}", channel_id);
        messages.into_iter().next().unwrap()
    }
}

#[async_trait]
impl ChatPlatform for FakeDiscord {
    fn bot_user_id(&self) -> &str {
        BOT_ID
    }

    async fn send(&self, channel_id: &str, content: &str) -> Result<String, DiscordError> {
        tokio::task::yield_now().await;
        let id = self.seed(channel_id, BOT_ID, content);
        self.state.lock().unwrap().sends += 1;
        Ok(id)
    }

    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), DiscordError> {
        tokio::task::yield_now().await;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if let Some(error) = state.edit_failures.pop_front() {
            return Err(error);
        }

        let id: u64 = message_id
            .parse()
            .map_err(|_| DiscordError::NotFound(message_id.into()))?;
        match state.messages.get_mut(&id) {
            Some(m) if m.channel_id == channel_id => {
                m.content = content.to_string();
                state.edits += 1;
                Ok(())
            }
            _ => Err(DiscordError::NotFound(format!("Unknown Message {}", id))),
        }
    }

    async fn fetch_recent(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<RecentMessage>, DiscordError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|(_, m)| m.channel_id == channel_id)
            .take(usize::from(limit))
            .map(|(id, m)| RecentMessage {
                id: id.to_string(),
                author_id: m.author_id.clone(),
                content: m.content.clone(),
            })
            .collect())
    }
}

/// A clock that only moves when told to.
pub struct FakeClock {
    now: Mutex<NaiveDateTime>,
}

impl FakeClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FakeClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.now.lock().unwrap())
    }

    fn now_local(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }
}

/// Friday 2025-08-01 10:00; the week anchor is Sunday 2025-08-03.
pub fn friday_morning() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 8, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

pub const SUNDAY: &str = "8/3/2025";

pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub sheet: Arc<FakeSheet>,
    pub discord: Arc<FakeDiscord>,
    pub clock: Arc<FakeClock>,
    pub heartbeat: HeartbeatReader,
}

impl Harness {
    pub async fn new(dir: &Path, sheet: FakeSheet, discord: FakeDiscord) -> Self {
        let sheet = Arc::new(sheet);
        let discord = Arc::new(discord);
        let clock = Arc::new(FakeClock::at(friday_morning()));

        let cancellations = CancellationStore::load(dir.join("cancellation.json"))
            .await
            .unwrap();
        let anchors = AnchorStore::load(dir.join("anchors.json")).await.unwrap();
        let (writer, reader) = heartbeat(Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap());

        let engine = SyncEngine::new(
            sheet.clone(),
            discord.clone(),
            clock.clone(),
            EngineConfig::new(ANNOUNCEMENTS, ROSTER),
            cancellations,
            anchors,
            writer,
        );

        Self {
            engine: Arc::new(engine),
            sheet,
            discord,
            clock,
            heartbeat: reader,
        }
    }
}
