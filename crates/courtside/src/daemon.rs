//! The `run` command: wires the sync engine to Discord and the sheet.
//!
//! Tasks:
//! - sync loop (cadence-driven cycles, rate-limit cooldowns)
//! - heartbeat monitor
//! - gateway listener and command dispatcher
//! - keepalive HTTP server

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use chrono::Utc;
use courtside_discord::{
    ChatPlatform, CommandInvocation, DEFAULT_API_BASE, DiscordClient, DiscordError, Gateway,
    InteractionReply, reconnect_backoff,
};
use courtside_sheets::SheetsClient;
use courtside_sync::{
    AnchorStore, Cadence, CancellationStore, Clock, Command, EngineConfig, HealthStatus,
    HeartbeatReader, SyncEngine, SyncError, SystemClock, command_specs, handle_command, heartbeat,
};
use miette::Result;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::keepalive;
use crate::log_channel::LogChannel;

/// Pending command invocations before the gateway blocks.
const COMMAND_QUEUE_SIZE: usize = 16;

/// Configuration for the daemon.
pub struct DaemonConfig {
    pub google_creds_json: String,
    pub spreadsheet_id: String,
    pub sheet_tab: String,
    pub discord_token: SecretString,
    pub announcements_channel_id: String,
    pub roster_channel_id: String,
    pub log_channel_id: Option<String>,
    pub port: u16,
    pub state_dir: PathBuf,
    pub active_interval: Duration,
    pub idle_interval: Duration,
    pub startup_jitter: Duration,
    pub heartbeat_interval: Duration,
    pub stale_after: Duration,
}

/// Default location for persisted state.
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courtside")
}

pub async fn run(config: DaemonConfig) -> Result<()> {
    if config.idle_interval >= config.stale_after {
        warn!(
            idle_secs = config.idle_interval.as_secs(),
            stale_secs = config.stale_after.as_secs(),
            "idle interval is not below the stale threshold; quiet weeks will report stale"
        );
    }

    // Shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("received shutdown signal");
            let _ = shutdown_tx.send(true);
        });
    }

    let (heartbeat_writer, heartbeat_reader) = heartbeat(Utc::now());

    // Keepalive comes up first so the host sees a live port during jitter.
    let keepalive_handle = {
        let reader = heartbeat_reader.clone();
        let shutdown_rx = shutdown_rx.clone();
        let port = config.port;
        let stale_after = config.stale_after;
        tokio::spawn(async move {
            if let Err(e) = keepalive::serve(port, reader, stale_after, shutdown_rx).await {
                error!(error = %e, "keepalive server failed");
            }
        })
    };

    let jitter = startup_delay(config.startup_jitter);
    info!(delay_ms = jitter.as_millis() as u64, "waiting before first remote call");
    tokio::time::sleep(jitter).await;

    let token = config.discord_token;
    let connected = retry_discord(
        "connect",
        reconnect_backoff(),
        &mut shutdown_rx.clone(),
        || {
            DiscordClient::connect(
                SecretString::from(token.expose_secret().to_owned()),
                DEFAULT_API_BASE,
            )
        },
    )
    .await
    .map_err(|e| miette::miette!("failed to connect to Discord: {}", e))?;
    let Some(discord) = connected else {
        info!("shut down before Discord connected");
        let _ = keepalive_handle.await;
        return Ok(());
    };
    let discord = Arc::new(discord);

    let sheets = SheetsClient::new(
        &config.google_creds_json,
        config.spreadsheet_id.clone(),
        config.sheet_tab.clone(),
    )
    .map_err(|e| miette::miette!("failed to create Sheets client: {}", e))?;

    let cancellations = CancellationStore::load(config.state_dir.join("cancellation.json"))
        .await
        .map_err(|e| miette::miette!("failed to load cancellation state: {}", e))?;
    let anchors = AnchorStore::load(config.state_dir.join("anchors.json"))
        .await
        .map_err(|e| miette::miette!("failed to load message anchors: {}", e))?;
    info!(state_dir = %config.state_dir.display(), "state loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let platform: Arc<dyn ChatPlatform> = discord.clone();
    let engine = Arc::new(SyncEngine::new(
        Arc::new(sheets),
        platform.clone(),
        clock.clone(),
        EngineConfig::new(
            config.announcements_channel_id.clone(),
            config.roster_channel_id.clone(),
        ),
        cancellations,
        anchors,
        heartbeat_writer,
    ));

    let log_channel = config
        .log_channel_id
        .as_ref()
        .map(|id| LogChannel::new(platform.clone(), id.clone()));

    let register_handle = {
        let discord = Arc::clone(&discord);
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let specs = command_specs();
            let registered = retry_discord("register commands", reconnect_backoff(), &mut shutdown_rx, || {
                discord.register_commands(&specs)
            })
            .await;
            if let Err(e) = registered {
                error!(error = %e, "slash command registration rejected");
            }
        })
    };

    // Sync loop
    let sync_handle = {
        let engine = Arc::clone(&engine);
        let clock = Arc::clone(&clock);
        let log_channel = log_channel.clone();
        let cadence = Cadence::new(config.active_interval, config.idle_interval);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(sync_loop(engine, clock, cadence, log_channel, shutdown_rx))
    };

    // Heartbeat monitor
    let monitor_handle = {
        let log_channel = log_channel.clone();
        let interval = config.heartbeat_interval;
        let stale_after = config.stale_after;
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(monitor_loop(
            heartbeat_reader,
            interval,
            stale_after,
            log_channel,
            shutdown_rx,
        ))
    };

    // Gateway and command dispatch
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
    let gateway_handle = {
        let gateway = Gateway::new(Arc::clone(&discord));
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.run(shutdown_rx, command_tx).await {
                error!(error = %e, "gateway stopped, slash commands unavailable");
            }
        })
    };
    let dispatch_handle = tokio::spawn(dispatch_commands(
        command_rx,
        Arc::clone(&engine),
        Arc::clone(&discord),
    ));

    info!("courtside running");

    for (task, handle) in [
        ("sync loop", sync_handle),
        ("heartbeat monitor", monitor_handle),
        ("command registration", register_handle),
        ("gateway", gateway_handle),
        ("command dispatch", dispatch_handle),
        ("keepalive", keepalive_handle),
    ] {
        if let Err(e) = handle.await {
            error!(task, error = %e, "task failed");
        }
    }

    info!("courtside stopped");
    Ok(())
}

/// Run a Discord call until it succeeds, backing off between attempts.
///
/// An auth failure is returned at once. `Ok(None)` means shutdown was
/// requested first.
async fn retry_discord<T, F, Fut>(
    what: &str,
    mut backoff: ExponentialBackoff,
    shutdown_rx: &mut watch::Receiver<bool>,
    mut op: F,
) -> Result<Option<T>, DiscordError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DiscordError>>,
{
    loop {
        if *shutdown_rx.borrow() {
            return Ok(None);
        }

        match op().await {
            Ok(value) => return Ok(Some(value)),
            Err(e @ DiscordError::Auth(_)) => return Err(e),
            Err(e) => {
                let wait = backoff.next_backoff().unwrap_or(backoff.max_interval);
                warn!(error = %e, what, wait_secs = wait.as_secs(), "Discord call failed, retrying");

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            return Ok(None);
                        }
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}

/// Random delay in `[0, max]`.
fn startup_delay(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// What to do after a cycle result: how long to sleep.
fn next_wait(result: &Result<(), SyncError>, cadence_wait: Duration) -> Duration {
    match result {
        Err(SyncError::RateLimited { retry_after }) => *retry_after,
        _ => cadence_wait,
    }
}

async fn sync_loop(
    engine: Arc<SyncEngine>,
    clock: Arc<dyn Clock>,
    cadence: Cadence,
    log_channel: Option<LogChannel>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        active_secs = cadence.active.as_secs(),
        idle_secs = cadence.idle.as_secs(),
        "sync loop started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let result = engine.run_cycle().await;
        match &result {
            Ok(report) => debug!(writes = report.writes(), "cycle complete"),
            Err(SyncError::RateLimited { retry_after }) => {
                warn!(wait_secs = retry_after.as_secs(), "Discord rate limited, backing off");
            }
            Err(e) => {
                error!(error = %e, "sync cycle failed");
                if let Some(log) = &log_channel {
                    log.report("⚠️ Sync failed", clock.now_utc(), e).await;
                }
            }
        }

        let wait = next_wait(
            &result.map(|_| ()),
            cadence.interval(clock.now_local()),
        );
        debug!(wait_secs = wait.as_secs(), "sleeping until next cycle");

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!("sync loop stopped");
}

async fn monitor_loop(
    heartbeat: HeartbeatReader,
    interval: Duration,
    stale_after: Duration,
    log_channel: Option<LogChannel>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let now = Utc::now();
                let last = heartbeat.last();
                match heartbeat.status(now, stale_after) {
                    HealthStatus::Healthy => {
                        info!(last_update = %last.to_rfc3339(), "heartbeat healthy");
                    }
                    HealthStatus::Stale => {
                        let minutes = (now - last).num_minutes();
                        warn!(last_update = %last.to_rfc3339(), minutes, "heartbeat stale");
                        if let Some(log) = &log_channel {
                            let message = format!("no successful update for {} minutes", minutes);
                            log.report("🫀 Heartbeat stale", now, message).await;
                        }
                    }
                }
            }
        }
    }
}

async fn dispatch_commands(
    mut rx: mpsc::Receiver<CommandInvocation>,
    engine: Arc<SyncEngine>,
    discord: Arc<DiscordClient>,
) {
    while let Some(invocation) = rx.recv().await {
        let engine = Arc::clone(&engine);
        let discord = Arc::clone(&discord);
        tokio::spawn(async move {
            if let Err(e) = answer(&engine, &discord, &invocation).await {
                warn!(error = %e, command = %invocation.name, "failed to answer command");
            }
        });
    }
}

async fn answer(
    engine: &SyncEngine,
    discord: &DiscordClient,
    invocation: &CommandInvocation,
) -> Result<(), courtside_discord::DiscordError> {
    let Some(command) = Command::from_invocation(invocation) else {
        let reply = InteractionReply::Ephemeral(format!("Unknown command `{}`.", invocation.name));
        return discord.respond(invocation, reply).await;
    };

    info!(
        command = %invocation.name,
        user = %invocation.display_name,
        "handling command"
    );

    if command.is_slow() {
        discord
            .respond(invocation, InteractionReply::DeferEphemeral)
            .await?;
        let text = handle_command(engine, command, invocation).await;
        discord.edit_original_response(invocation, &text).await
    } else {
        let text = handle_command(engine, command, invocation).await;
        discord
            .respond(invocation, InteractionReply::Ephemeral(text))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant_backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(1),
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_discord_survives_connection_errors() {
        let (_tx, mut rx) = watch::channel(false);
        let attempts = AtomicUsize::new(0);

        let result = retry_discord("connect", instant_backoff(), &mut rx, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Err(DiscordError::Connection("connection refused".into())),
                    1 => Err(DiscordError::Api {
                        status: 503,
                        body: "unavailable".into(),
                    }),
                    _ => Ok(n),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, Some(2));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_discord_stops_on_auth() {
        let (_tx, mut rx) = watch::channel(false);
        let attempts = AtomicUsize::new(0);

        let result: Result<Option<()>, _> = retry_discord("connect", instant_backoff(), &mut rx, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(DiscordError::Auth("401 Unauthorized".into())) }
        })
        .await;

        assert!(matches!(result, Err(DiscordError::Auth(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_discord_gives_way_to_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result: Result<Option<()>, _> = retry_discord("connect", instant_backoff(), &mut rx, || async {
            Err(DiscordError::Connection("unreachable".into()))
        })
        .await;

        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_startup_delay_bounded() {
        for _ in 0..100 {
            assert!(startup_delay(Duration::from_secs(30)) <= Duration::from_secs(30));
        }
        assert_eq!(startup_delay(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_rate_limit_overrides_cadence() {
        let cadence_wait = Duration::from_secs(60);
        assert_eq!(
            next_wait(
                &Err(SyncError::RateLimited {
                    retry_after: Duration::from_secs(80)
                }),
                cadence_wait
            ),
            Duration::from_secs(80)
        );
        assert_eq!(next_wait(&Ok(()), cadence_wait), cadence_wait);
        assert_eq!(
            next_wait(&Err(SyncError::Timeout("roster fetch")), cadence_wait),
            cadence_wait
        );
    }

    #[test]
    fn test_default_state_dir_is_namespaced() {
        assert!(default_state_dir().ends_with("courtside"));
    }
}
