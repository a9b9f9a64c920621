//! Command-line interface for the scanner console.
//!
//! ```bash
//! # Check into session-7 using the default config file
//! checkin-scanner --context session-7
//!
//! # Custom config and database, no reachability probe
//! checkin-scanner --config ./scanner.toml --db ./queue.db --offline
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Offline-tolerant QR check-in scanner.
///
/// Type a code and press enter to check it in. Lines starting with `:` are
/// console commands (`:help` lists them).
#[derive(Debug, Parser)]
#[command(name = "checkin-scanner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to scanner.toml (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the queue database
    #[arg(long, value_name = "FILE", env = "CHECKIN_DB_PATH")]
    pub db: Option<PathBuf>,

    /// Context (event or session) to check codes into
    #[arg(long, value_name = "ID")]
    pub context: Option<String>,

    /// Disable the reachability probe; connectivity changes only via
    /// `:online` / `:offline`
    #[arg(long)]
    pub offline: bool,

    /// Print scan outcomes as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
