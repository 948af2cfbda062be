//! Cardbox - spaced-repetition flashcard boxes
//!
//! Command line entry point: manages factsheets, cardsets and boxes in a
//! local libSQL database and runs study sessions and background tasks.

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "cardbox")]
#[command(about = "Spaced-repetition flashcard boxes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Shortcut for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    /// Database path (overrides CARDBOX_DB_PATH env var and default)
    #[arg(long, env = "CARDBOX_DB_PATH")]
    db: Option<String>,

    /// Configuration file (overrides CARDBOX_CONFIG env var)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Acting user
    #[arg(long, env = "CARDBOX_USER", default_value = "default")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Init,

    /// Manage factsheets
    List {
        #[command(subcommand)]
        action: ListCommands,
    },

    /// Manage cardsets
    Cardset {
        #[command(subcommand)]
        action: CardsetCommands,
    },

    /// Manage boxes
    Box {
        #[command(subcommand)]
        action: BoxCommands,
    },

    /// Study the cards of a box
    Study {
        #[command(subcommand)]
        action: StudyCommands,
    },

    /// Show daily statistics of a box
    Stats {
        /// Box id
        #[arg(long = "box")]
        box_id: String,

        #[command(subcommand)]
        action: Option<StatsCommands>,
    },

    /// Resync a box and run its tasks at their scheduled time until interrupted
    Worker {
        /// Box id
        #[arg(long = "box")]
        box_id: String,

        /// Days of statistics to backfill
        #[arg(long, default_value = "1")]
        days: u32,
    },
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// Import a factsheet from a YAML file
    Import {
        /// Title of the list; its name is derived from it
        title: String,

        /// YAML file with `columns` and `rows`
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum CardsetCommands {
    /// Create a cardset over a factsheet
    Create {
        #[arg(short, long)]
        title: String,

        /// Factsheet name
        #[arg(short, long)]
        factsheet: String,

        #[arg(long)]
        template: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BoxCommands {
    /// Create an empty box
    Create {
        #[arg(short, long)]
        title: String,

        /// Reschedule policy (linear, exponential)
        #[arg(short, long)]
        policy: Option<String>,
    },

    /// Replace the cardsets a box subscribes to
    Subscribe {
        #[arg(long = "box")]
        box_id: String,

        /// Comma-separated cardset ids
        #[arg(long, value_delimiter = ',')]
        cardsets: Vec<i64>,
    },

    /// Show learning progress of a box
    Show {
        #[arg(long = "box")]
        box_id: String,
    },
}

#[derive(Subcommand)]
pub enum StudyCommands {
    /// Present the next card
    Next {
        #[arg(long = "box")]
        box_id: String,
    },

    /// Answer a card
    Answer {
        #[arg(long = "box")]
        box_id: String,

        /// Card id as shown by `study next`
        #[arg(long)]
        card: String,

        /// The answer was wrong
        #[arg(long)]
        wrong: bool,
    },
}

#[derive(Subcommand)]
pub enum StatsCommands {
    /// Schedule snapshots for the last days and run them
    Backfill {
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        cli.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cardbox={},cardbox_core={}", level, level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Cardbox v{} starting...", env!("CARGO_PKG_VERSION"));

    let db_path = cli::helpers::get_db_path(cli.db);
    let config = cardbox_core::CardboxConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => cli::init::handle(&db_path).await?,
        Commands::List { action } => cli::list::handle(&db_path, config, action).await?,
        Commands::Cardset { action } => {
            cli::cardset::handle(&db_path, config, &cli.user, action).await?
        }
        Commands::Box { action } => cli::boxes::handle(&db_path, config, &cli.user, action).await?,
        Commands::Study { action } => {
            cli::study::handle(&db_path, config, &cli.user, action).await?
        }
        Commands::Stats { box_id, action } => {
            cli::stats::handle(&db_path, config, &cli.user, &box_id, action).await?
        }
        Commands::Worker { box_id, days } => {
            cli::worker::handle(&db_path, config, &cli.user, &box_id, days).await?
        }
    }

    Ok(())
}
