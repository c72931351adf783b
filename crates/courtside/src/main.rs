//! Courtside: Sunday volleyball roster bot
//!
//! Main binary with subcommands:
//! - `run`: sync the sign-up sheet into Discord, answer admin commands
//! - `preview`: print the rendered roster for a date without touching Discord

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use courtside_sync::{Clock, SystemClock};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;
mod keepalive;
mod log_channel;

#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "Keeps the Sunday volleyball roster in Discord up to date", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct SheetArgs {
    /// Service account key JSON (the whole file contents)
    #[arg(long, env = "GOOGLE_CREDS_JSON", hide_env_values = true)]
    google_creds_json: String,

    /// Spreadsheet id from the sheet URL
    #[arg(long, env = "SPREADSHEET_ID")]
    spreadsheet_id: String,

    /// Tab the form writes responses to
    #[arg(long, env = "SHEET_TAB", default_value = courtside_sheets::DEFAULT_TAB)]
    sheet_tab: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot
    Run {
        #[command(flatten)]
        sheet: SheetArgs,

        /// Discord bot token
        #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
        discord_token: String,

        /// Channel for the status announcement
        #[arg(long, env = "ANNOUNCEMENTS_CHANNEL_ID")]
        announcements_channel_id: String,

        /// Channel for the full roster
        #[arg(long, env = "ROSTER_CHANNEL_ID")]
        roster_channel_id: String,

        /// Channel that receives failure reports
        #[arg(long, env = "LOG_CHANNEL_ID")]
        log_channel_id: Option<String>,

        /// Keepalive HTTP port
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,

        /// Directory for cancellation.json and anchors.json
        #[arg(long, env = "COURTSIDE_STATE_DIR")]
        state_dir: Option<PathBuf>,

        /// Seconds between cycles from Friday through Sunday 17:00
        #[arg(long, env = "COURTSIDE_ACTIVE_INTERVAL", default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
        active_interval: u64,

        /// Seconds between cycles the rest of the week
        #[arg(long, env = "COURTSIDE_IDLE_INTERVAL", default_value = "240", value_parser = clap::value_parser!(u64).range(1..))]
        idle_interval: u64,

        /// Upper bound in seconds on the random delay before the first remote call
        #[arg(long, env = "COURTSIDE_STARTUP_JITTER", default_value = "30")]
        startup_jitter: u64,

        /// Seconds between heartbeat checks
        #[arg(long, env = "COURTSIDE_HEARTBEAT_INTERVAL", default_value = "900", value_parser = clap::value_parser!(u64).range(1..))]
        heartbeat_interval: u64,

        /// Seconds without a successful cycle before reporting stale
        #[arg(long, env = "COURTSIDE_STALE_AFTER", default_value = "300")]
        stale_after: u64,
    },

    /// Print the rendered roster without posting it
    Preview {
        #[command(flatten)]
        sheet: SheetArgs,

        /// Session date (YYYY-MM-DD); defaults to the upcoming Sunday
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "courtside=info,courtside_sync=info,courtside_discord=info,courtside_sheets=info,courtside_roster=info"
                    .to_string()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            sheet,
            discord_token,
            announcements_channel_id,
            roster_channel_id,
            log_channel_id,
            port,
            state_dir,
            active_interval,
            idle_interval,
            startup_jitter,
            heartbeat_interval,
            stale_after,
        } => {
            daemon::run(daemon::DaemonConfig {
                google_creds_json: sheet.google_creds_json,
                spreadsheet_id: sheet.spreadsheet_id,
                sheet_tab: sheet.sheet_tab,
                discord_token: discord_token.into(),
                announcements_channel_id,
                roster_channel_id,
                log_channel_id: log_channel_id.filter(|id| !id.trim().is_empty()),
                port,
                state_dir: state_dir.unwrap_or_else(daemon::default_state_dir),
                active_interval: Duration::from_secs(active_interval),
                idle_interval: Duration::from_secs(idle_interval),
                startup_jitter: Duration::from_secs(startup_jitter),
                heartbeat_interval: Duration::from_secs(heartbeat_interval),
                stale_after: Duration::from_secs(stale_after),
            })
            .await
        }

        Commands::Preview { sheet, date } => run_preview(sheet, date).await,
    }
}

async fn run_preview(sheet: SheetArgs, date: Option<NaiveDate>) -> Result<()> {
    let client = courtside_sheets::SheetsClient::new(
        &sheet.google_creds_json,
        sheet.spreadsheet_id,
        sheet.sheet_tab,
    )
    .map_err(|e| miette::miette!("failed to create Sheets client: {}", e))?;

    let date = date.unwrap_or_else(|| courtside_roster::next_sunday(SystemClock.today()));
    let roster = courtside_roster::fetch_roster(&client, date, courtside_roster::CAPACITY)
        .await
        .map_err(|e| miette::miette!("failed to fetch roster: {}", e))?;

    println!("{}", courtside_roster::render_announcement(&roster, None));
    println!();
    println!("{}", courtside_roster::render_roster(&roster, None));
    Ok(())
}
