//! # Operator Console
//!
//! Line-oriented front end: a line is either a manual code or a command.
//!
//! ```text
//! EVT-42            submit EVT-42 into the active context
//! :sync             replay the offline queue now
//! :status           queue, connectivity and camera state
//! :clear            drop every queued scan
//! :rejections       last rejected replays
//! :context <id>     switch the active context
//! :camera / :stop   start or stop camera capture
//! :online / :offline  report connectivity by hand
//! :help, :quit
//! ```

use checkin_sync::{CheckInAgent, CheckInError, ReplayRun};

use crate::error::AppResult;

/// Number of rejections `:rejections` shows.
const REJECTIONS_SHOWN: u32 = 10;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Code(String),
    Sync,
    Status,
    Clear,
    Rejections,
    Context(String),
    Camera,
    StopCamera,
    Online,
    Offline,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleCommand::Empty;
        }

        let Some(command) = line.strip_prefix(':') else {
            return ConsoleCommand::Code(line.to_string());
        };

        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next().map(str::trim).unwrap_or_default();

        match name.as_str() {
            "sync" => ConsoleCommand::Sync,
            "status" => ConsoleCommand::Status,
            "clear" => ConsoleCommand::Clear,
            "rejections" => ConsoleCommand::Rejections,
            "context" if !arg.is_empty() => ConsoleCommand::Context(arg.to_string()),
            "camera" => ConsoleCommand::Camera,
            "stop" => ConsoleCommand::StopCamera,
            "online" => ConsoleCommand::Online,
            "offline" => ConsoleCommand::Offline,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "q" | "exit" => ConsoleCommand::Quit,
            _ => ConsoleCommand::Unknown(line.to_string()),
        }
    }
}

/// Whether the console keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Runs one command against the agent.
///
/// Operator mistakes are printed and do not end the session; only
/// unexpected failures are returned.
pub async fn execute(agent: &CheckInAgent, command: ConsoleCommand) -> AppResult<Flow> {
    match command {
        ConsoleCommand::Empty => {}

        ConsoleCommand::Code(code) => {
            let Some(context_id) = agent.active_context().await else {
                println!("No active context. Use :context <id> first.");
                return Ok(Flow::Continue);
            };

            match agent.submit_manual_code(&code, &context_id).await {
                // Outcome is printed by the emitter.
                Ok(_) => {}
                Err(CheckInError::Validation(e)) => println!("Invalid code: {}", e),
                Err(CheckInError::QueuePersistence(_)) => {
                    println!("FAILED  {}  (not saved, scan again)", code.trim())
                }
                Err(e) => return Err(e.into()),
            }
        }

        ConsoleCommand::Sync => match agent.manual_sync().await? {
            ReplayRun::Completed(report) => println!(
                "Sync: {} attempted, {} accepted, {} rejected, {} pending{}",
                report.attempted,
                report.accepted,
                report.rejected,
                report.remaining,
                if report.halted { " (service unreachable)" } else { "" }
            ),
            ReplayRun::AlreadyRunning => println!("Sync already in progress"),
        },

        ConsoleCommand::Status => {
            let status = agent.queue_status().await?;
            println!("Device:       {}", agent.device_id());
            println!(
                "Context:      {}",
                agent.active_context().await.as_deref().unwrap_or("(none)")
            );
            println!("Connectivity: {}", agent.connectivity());
            println!("Camera:       {}", agent.capture_state().await);
            println!("Pending:      {} ({} stuck)", status.pending, status.stuck);
            if let Some(oldest) = status.oldest_enqueued_at {
                println!("Oldest:       {}", oldest.to_rfc3339());
            }
            println!("Rejected:     {} (see :rejections)", agent.rejection_count().await?);
        }

        ConsoleCommand::Clear => {
            let removed = agent.clear_queue().await?;
            println!("Cleared {} queued scan(s)", removed);
        }

        ConsoleCommand::Rejections => {
            let rejections = agent.recent_rejections(REJECTIONS_SHOWN).await?;
            if rejections.is_empty() {
                println!("No rejected replays");
            }
            for r in rejections {
                println!(
                    "{}  {}  {}  {}",
                    r.rejected_at.to_rfc3339(),
                    r.context_id,
                    r.code,
                    r.reason
                );
            }
        }

        ConsoleCommand::Context(id) => match agent.set_active_context(&id).await {
            Ok(()) => println!("Active context: {}", id.trim()),
            Err(e) => println!("Invalid context: {}", e),
        },

        ConsoleCommand::Camera => {
            let Some(context_id) = agent.active_context().await else {
                println!("No active context. Use :context <id> first.");
                return Ok(Flow::Continue);
            };
            match agent.start_capture(&context_id).await {
                Ok(()) => println!("Camera active"),
                Err(e) if e.is_camera_error() => {
                    println!("Camera unavailable ({}). Manual entry still works.", e)
                }
                Err(e) => println!("Camera not started: {}", e),
            }
        }

        ConsoleCommand::StopCamera => {
            agent.stop_capture().await;
            println!("Camera stopped");
        }

        ConsoleCommand::Online => agent.report_connectivity(true),
        ConsoleCommand::Offline => agent.report_connectivity(false),

        ConsoleCommand::Help => print_help(),

        ConsoleCommand::Quit => return Ok(Flow::Quit),

        ConsoleCommand::Unknown(line) => println!("Unknown command: {} (:help)", line),
    }

    Ok(Flow::Continue)
}

pub fn print_help() {
    println!("Type a code and press enter to check it in.");
    println!("  :sync             replay queued scans now");
    println!("  :status           show queue and device status");
    println!("  :clear            drop all queued scans");
    println!("  :rejections       show rejected replays");
    println!("  :context <id>     switch the active context");
    println!("  :camera / :stop   start or stop the camera");
    println!("  :online / :offline  report connectivity");
    println!("  :quit             exit");
}
