//! # convsync-sim
//!
//! Drives the convsync message store and job scheduler against in-memory
//! collaborators.
//!
//! ## Commands
//!
//! - `paginate`: open a synthetic conversation and page through it
//! - `deliver`: send one message through the scheduler across an outage
//! - `config`: print the effective configuration
//!
//! ## Example
//!
//! ```bash
//! # Open at the oldest message and page towards the newest
//! convsync-sim paginate --messages 350 --anchor m0 --direction below
//!
//! # Network comes back after half a second, then two 503s before success
//! convsync-sim deliver --offline-ms 500 --failures 2
//!
//! # Show what a config file resolves to
//! convsync-sim --config convsync.toml config
//! ```
//!
//! Reports are printed to stdout as JSON; logs go to stderr (`RUST_LOG`).

use anyhow::Result;
use chat_core::Direction;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod settings;

use commands::{deliver, paginate, show_config};

/// Simulator for the convsync messenger core.
#[derive(Parser, Debug)]
#[command(name = "convsync-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Pagination direction.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PageDirection {
    /// Towards older messages
    Above,
    /// Towards newer messages
    Below,
}

impl From<PageDirection> for Direction {
    fn from(direction: PageDirection) -> Self {
        match direction {
            PageDirection::Above => Direction::Above,
            PageDirection::Below => Direction::Below,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Page through a synthetic conversation
    Paginate {
        /// Messages in the synthetic history
        #[arg(long, default_value = "350")]
        messages: usize,

        /// Message id to open at (m0 is the oldest)
        #[arg(long)]
        anchor: Option<String>,

        /// Direction to page in
        #[arg(long, value_enum, default_value = "above")]
        direction: PageDirection,

        /// Stop after this many pages
        #[arg(long, default_value = "100")]
        max_pages: usize,
    },

    /// Send one message through the job scheduler
    Deliver {
        /// How long the network stays unreachable, in milliseconds
        #[arg(long, default_value = "0")]
        offline_ms: u64,

        /// Transient server errors before the send goes through
        #[arg(long, default_value = "0")]
        failures: usize,

        /// End with a fatal rejection instead of succeeding
        #[arg(long)]
        reject: bool,
    },

    /// Print the effective configuration
    Config,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Paginate {
            messages,
            anchor,
            direction,
            max_pages,
        } => {
            let report = paginate::run(&config, messages, anchor, direction.into(), max_pages).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Deliver {
            offline_ms,
            failures,
            reject,
        } => {
            let report = deliver::run(&config, offline_ms, failures, reject).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config => {
            print!("{}", show_config::run(&config)?);
        }
    }

    Ok(())
}
