mod app;
mod commands;
mod render;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::App;

#[derive(Parser)]
#[command(name = "famcal")]
#[command(about = "Sync family calendar feeds into month buckets without losing what you attached")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List calendars and how their last sync went
    Calendars,
    /// Register a calendar
    Add {
        /// Calendar id (also its directory name)
        id: String,

        /// iCalendar feed URL (https:// or webcal://)
        #[arg(long, conflicts_with_all = ["google", "local"])]
        url: Option<String>,

        /// Public calendar ID of a provider calendar
        #[arg(long, conflicts_with = "local")]
        google: Option<String>,

        /// Calendar without a feed
        #[arg(long)]
        local: bool,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// User ids following this calendar
        #[arg(short, long = "subscriber")]
        subscribers: Vec<String>,
    },
    /// Sync calendars from their feeds
    Sync {
        /// Only sync these calendars (default: every calendar with a feed)
        #[arg(short, long = "calendar")]
        calendars: Vec<String>,

        #[arg(long)]
        months_back: Option<u32>,

        #[arg(long)]
        months_forward: Option<u32>,

        /// Print the raw response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync every calendar on the configured schedule
    Daemon {
        /// Run one scheduled sync now and exit
        #[arg(long)]
        once: bool,
    },
    /// Show the events stored for one month
    Events {
        #[arg(short, long)]
        calendar: String,

        /// Month as YYYY-MM (default: current month)
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Create an event by hand
    New {
        title: String,

        #[arg(short, long)]
        calendar: String,

        /// Start in the home timezone, e.g. "2025-03-20T15:00" or "2025-03-20" for all-day
        #[arg(short, long)]
        start: String,

        /// e.g. "45m", "1h 30m" (ignored for all-day events)
        #[arg(short, long, default_value = "1h")]
        duration: String,

        #[arg(short, long)]
        location: Option<String>,
    },
    /// Apply an event template to a date
    Template {
        /// Path to the template TOML file
        path: std::path::PathBuf,

        #[arg(short, long)]
        calendar: String,

        /// First day of the template (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
    },
    /// Show stored admin alerts
    Alerts {
        /// Number of most recent alerts to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,famcal_core=info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set up logging: {}", e))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let app = App::load()?;

    match cli.command {
        Commands::Calendars => commands::calendars::run(&app).await,
        Commands::Add {
            id,
            url,
            google,
            local,
            name,
            subscribers,
        } => commands::add::run(&app, id, url, google, local, name, subscribers).await,
        Commands::Sync {
            calendars,
            months_back,
            months_forward,
            json,
        } => commands::sync::run(&app, calendars, months_back, months_forward, json).await,
        Commands::Daemon { once } => commands::daemon::run(&app, once).await,
        Commands::Events { calendar, month } => {
            commands::events::run(&app, &calendar, month.as_deref()).await
        }
        Commands::New {
            title,
            calendar,
            start,
            duration,
            location,
        } => commands::new::run(&app, &calendar, title, &start, &duration, location).await,
        Commands::Template {
            path,
            calendar,
            date,
        } => commands::template::run(&app, &calendar, &path, &date).await,
        Commands::Alerts { limit } => commands::alerts::run(&app, limit).await,
    }
}
