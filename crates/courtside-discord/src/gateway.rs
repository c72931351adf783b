//! Gateway session that forwards slash-command invocations.
//!
//! Only what the bot needs is implemented: hello, identify, heartbeats with
//! ack tracking, and `INTERACTION_CREATE` dispatch. Resume is not attempted;
//! any disconnect starts a fresh session after a randomized backoff.

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use crate::{CommandInvocation, DiscordClient, DiscordError};

const GATEWAY_VERSION: u8 = 10;

/// GUILDS intent. Interactions are delivered regardless of intents.
const INTENTS: u64 = 1;

/// Application command interaction type.
const INTERACTION_APPLICATION_COMMAND: u64 = 2;

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

/// How long to wait for the server's hello after connecting.
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u64,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Reconnect policy for Discord connections: start around a minute, grow to
/// at most fifteen minutes, half-width jitter, never give up.
pub fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(60),
        max_interval: Duration::from_secs(15 * 60),
        randomization_factor: 0.5,
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Long-lived gateway connection.
pub struct Gateway {
    client: Arc<DiscordClient>,
    backoff: ExponentialBackoff,
}

impl Gateway {
    /// Create a gateway with [`reconnect_backoff`].
    pub fn new(client: Arc<DiscordClient>) -> Self {
        Self::with_backoff(client, reconnect_backoff())
    }

    pub fn with_backoff(client: Arc<DiscordClient>, backoff: ExponentialBackoff) -> Self {
        Self { client, backoff }
    }

    /// Run sessions until shutdown, sending each command invocation to `tx`.
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        tx: mpsc::Sender<CommandInvocation>,
    ) -> Result<(), DiscordError> {
        loop {
            if *shutdown_rx.borrow() {
                info!("gateway shutting down");
                return Ok(());
            }

            match self.session(&mut shutdown_rx, &tx).await {
                Ok(()) => return Ok(()),
                Err(DiscordError::Auth(e)) => {
                    error!(error = %e, "gateway rejected bot token");
                    return Err(DiscordError::Auth(e));
                }
                Err(e) => {
                    let wait = self
                        .backoff
                        .next_backoff()
                        .unwrap_or(self.backoff.max_interval);
                    warn!(error = %e, wait_secs = wait.as_secs(), "gateway disconnected, reconnecting");

                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                return Ok(());
                            }
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// One connection, from hello until close. Returns `Ok` only on shutdown.
    async fn session(
        &mut self,
        shutdown_rx: &mut watch::Receiver<bool>,
        tx: &mpsc::Sender<CommandInvocation>,
    ) -> Result<(), DiscordError> {
        let base = self.client.gateway_url().await?;
        let url = format!("{}/?v={}&encoding=json", base, GATEWAY_VERSION);
        debug!(url = %url, "connecting to gateway");

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| DiscordError::Connection(format!("connection failed: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        let hello = timeout(HELLO_TIMEOUT, read.next())
            .await
            .map_err(|_| DiscordError::Connection("timed out waiting for hello".into()))?;
        let heartbeat_ms = match hello {
            Some(Ok(Message::Text(text))) => parse_hello(&text)?,
            Some(Ok(other)) => {
                return Err(DiscordError::InvalidResponse(format!(
                    "expected hello, got {:?}",
                    other
                )));
            }
            Some(Err(e)) => return Err(DiscordError::Connection(e.to_string())),
            None => return Err(DiscordError::Connection("closed before hello".into())),
        };

        let identify = identify_payload(self.client.token().expose_secret());
        write
            .send(Message::Text(identify.to_string()))
            .await
            .map_err(|e| DiscordError::Connection(format!("identify failed: {}", e)))?;

        let period = Duration::from_millis(heartbeat_ms);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut seq: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
                _ = heartbeat.tick() => {
                    if !acked {
                        return Err(DiscordError::Connection("heartbeat not acknowledged".into()));
                    }
                    acked = false;
                    trace!(?seq, "sending heartbeat");
                    write
                        .send(Message::Text(heartbeat_payload(seq).to_string()))
                        .await
                        .map_err(|e| DiscordError::Connection(format!("heartbeat failed: {}", e)))?;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            if let Some(frame) = &frame
                                && u16::from(frame.code) == 4004
                            {
                                return Err(DiscordError::Auth(frame.reason.to_string()));
                            }
                            return Err(DiscordError::Connection(format!("closed by server: {:?}", frame)));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(DiscordError::Connection(e.to_string())),
                        None => return Err(DiscordError::Connection("stream ended".into())),
                    };

                    let payload: GatewayPayload = serde_json::from_str(&text)?;
                    if payload.s.is_some() {
                        seq = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => match payload.t.as_deref() {
                            Some("READY") => {
                                info!("gateway session ready");
                                self.backoff.reset();
                            }
                            Some("INTERACTION_CREATE") => {
                                if let Some(invocation) = parse_interaction(&payload.d) {
                                    debug!(command = %invocation.name, user = %invocation.user_id, "command received");
                                    if tx.send(invocation).await.is_err() {
                                        debug!("command receiver closed, ending session");
                                        return Ok(());
                                    }
                                }
                            }
                            _ => {}
                        },
                        OP_HEARTBEAT => {
                            write
                                .send(Message::Text(heartbeat_payload(seq).to_string()))
                                .await
                                .map_err(|e| DiscordError::Connection(format!("heartbeat failed: {}", e)))?;
                        }
                        OP_HEARTBEAT_ACK => acked = true,
                        OP_RECONNECT => {
                            return Err(DiscordError::Connection("server requested reconnect".into()));
                        }
                        OP_INVALID_SESSION => {
                            return Err(DiscordError::Connection("session invalidated".into()));
                        }
                        other => trace!(op = other, "ignoring gateway op"),
                    }
                }
            }
        }
    }
}

fn parse_hello(text: &str) -> Result<u64, DiscordError> {
    let payload: GatewayPayload = serde_json::from_str(text)?;
    if payload.op != OP_HELLO {
        return Err(DiscordError::InvalidResponse(format!(
            "expected hello, got op {}",
            payload.op
        )));
    }
    payload
        .d
        .get("heartbeat_interval")
        .and_then(Value::as_u64)
        .ok_or_else(|| DiscordError::InvalidResponse("hello without heartbeat_interval".into()))
}

fn identify_payload(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "courtside",
                "device": "courtside",
            },
        },
    })
}

fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": seq })
}

/// Extract a slash-command invocation from an `INTERACTION_CREATE` body.
///
/// Returns `None` for other interaction kinds (components, autocomplete).
pub fn parse_interaction(d: &Value) -> Option<CommandInvocation> {
    if d.get("type").and_then(Value::as_u64) != Some(INTERACTION_APPLICATION_COMMAND) {
        return None;
    }

    let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    let member = d.get("member");
    let user = member
        .and_then(|m| m.get("user"))
        .or_else(|| d.get("user"))?;

    let display_name = member
        .and_then(|m| str_field(m, "nick"))
        .or_else(|| str_field(user, "global_name"))
        .or_else(|| str_field(user, "username"))
        .unwrap_or_default();

    let data = d.get("data")?;
    let options = data
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .filter_map(|o| {
                    let name = str_field(o, "name")?;
                    let value = match o.get("value")? {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Some((name, value))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(CommandInvocation {
        interaction_id: str_field(d, "id")?,
        token: str_field(d, "token")?,
        name: str_field(data, "name")?,
        options,
        user_id: str_field(user, "id")?,
        display_name,
    })
}
