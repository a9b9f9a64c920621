//! # Check-In Scanner Entry Point
//!
//! The actual setup is in lib.rs for better testability.

use clap::Parser;
use checkin_scanner::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    checkin_scanner::init_tracing(cli.verbose);

    if let Err(err) = checkin_scanner::run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(err.exit_code());
    }
}
