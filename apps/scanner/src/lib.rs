//! # Check-In Scanner Console
//!
//! Operator console for the check-in engine.
//!
//! ## Module Organization
//! ```text
//! checkin_scanner/
//! ├── lib.rs        ◄─── You are here (startup & run loop)
//! ├── cli.rs        ◄─── clap argument definitions
//! ├── console.rs    ◄─── Line parsing and command execution
//! ├── emitter.rs    ◄─── Prints scan outcomes and status
//! └── error.rs      ◄─── Binary error type
//! ```

pub mod cli;
pub mod console;
pub mod emitter;
pub mod error;

use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use checkin_db::{Database, DbConfig};
use checkin_sync::{CheckInAgentBuilder, CheckInConfig};

use cli::Cli;
use console::{ConsoleCommand, Flow};
use emitter::{ConsoleEmitter, OutputFormat};
use error::{AppError, AppResult};

/// Runs the console until `:quit`, end of input or Ctrl-C.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                       Scanner Startup                                   │
/// │                                                                         │
/// │  1. Load Configuration ───────────────────────────────────────────────► │
/// │     • scanner.toml, then CHECKIN_* environment, then CLI flags          │
/// │                                                                         │
/// │  2. Determine Database Path ──────────────────────────────────────────► │
/// │     • --db / CHECKIN_DB_PATH, else the platform data directory          │
/// │                                                                         │
/// │  3. Connect to Database ──────────────────────────────────────────────► │
/// │     • SQLite with WAL mode, pending migrations applied                  │
/// │                                                                         │
/// │  4. Build & Start CheckInAgent ───────────────────────────────────────► │
/// │     • Device identity loaded or created                                 │
/// │     • Probe reports Online → queued scans replay                        │
/// │                                                                         │
/// │  5. Read stdin ───────────────────────────────────────────────────────► │
/// │     • code lines → manual check-in, `:cmd` lines → console commands     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run(cli: Cli) -> AppResult<()> {
    let mut config = CheckInConfig::load(cli.config.clone())?;
    if let Some(context) = &cli.context {
        config.context.default_id = Some(context.clone());
    }
    if cli.offline {
        config.connectivity.probe_enabled = false;
    }
    config.validate()?;

    let db_path = get_database_path(cli.db.clone())?;
    info!(?db_path, "Database path determined");

    let db = Database::new(DbConfig::new(db_path)).await?;
    info!("Database connected and migrations applied");

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let mut agent = CheckInAgentBuilder::new(config)
        .with_database(db.clone())
        .with_emitter(Arc::new(ConsoleEmitter::new(format)))
        .build()
        .await?;
    agent.start().await?;

    if format == OutputFormat::Text {
        console::print_help();
        if agent.active_context().await.is_none() {
            println!("No context selected yet. Use :context <id>.");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break Ok(());
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(AppError::from(e)),
        };

        match console::execute(&agent, ConsoleCommand::parse(&line)).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break Ok(()),
            Err(e) => {
                warn!(error = %e, "Console command failed");
                println!("ERROR    {}", e);
            }
        }
    };

    agent.shutdown().await?;
    db.close().await;
    result
}

/// Initializes the tracing subscriber for structured logging.
///
/// Logs go to stderr so stdout carries only scan output.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=checkin_sync=trace` - Trace the engine only
/// - Default: `info,checkin=debug,sqlx=warn`, raised by `-v`
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info,checkin=debug,sqlx=warn",
        1 => "debug,sqlx=warn",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Determines the database file path.
///
/// ## Platform-Specific Paths
/// - **macOS**: `~/Library/Application Support/com.checkin.scanner/scanner.db`
/// - **Windows**: `%APPDATA%\checkin\scanner\data\scanner.db`
/// - **Linux**: `~/.local/share/scanner/scanner.db`
///
/// `--db` (or `CHECKIN_DB_PATH`) wins when given.
fn get_database_path(override_path: Option<PathBuf>) -> AppResult<PathBuf> {
    if let Some(path) = override_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(path);
    }

    let proj_dirs = ProjectDirs::from("com", "checkin", "scanner").ok_or(AppError::NoDataDir)?;
    let data_dir = proj_dirs.data_dir();

    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("scanner.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.db");

        let resolved = get_database_path(Some(path.clone())).unwrap();
        assert_eq!(resolved, path);
        assert!(dir.path().join("nested").is_dir());
    }
}
