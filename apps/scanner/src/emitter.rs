//! # Console Emitter
//!
//! Prints engine events for the operator, either as short status lines or
//! as JSON (one object per line) for a wrapping UI.
//!
//! ```text
//! OK       EVT-42  session-7  Ada Lovelace
//! QUEUED   EVT-43  session-7  (pending sync)
//! REJECTED EVT-44  session-7  ALREADY_CHECKED_IN
//! SYNCED   EVT-43  session-7
//! ```

use checkin_core::{CaptureState, QueueStatus, ScanOutcome, SubmissionOrigin};
use checkin_sync::ScanEventEmitter;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// [`ScanEventEmitter`] writing to stdout.
#[derive(Debug)]
pub struct ConsoleEmitter {
    format: OutputFormat,
}

impl ConsoleEmitter {
    pub fn new(format: OutputFormat) -> Self {
        ConsoleEmitter { format }
    }

    fn print_json(&self, event: &str, payload: serde_json::Value) {
        let line = json!({ "event": event, "payload": payload });
        println!("{}", line);
    }
}

/// Human-readable line for one outcome.
pub fn describe(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Accepted {
            code,
            context_id,
            origin,
            record,
        } => {
            let label = match origin {
                SubmissionOrigin::Live => "OK      ",
                SubmissionOrigin::Replay => "SYNCED  ",
            };
            match &record.attendee_name {
                Some(name) => format!("{} {}  {}  {}", label, code, context_id, name),
                None => format!("{} {}  {}", label, code, context_id),
            }
        }
        ScanOutcome::Rejected {
            code,
            context_id,
            reason,
            ..
        } => format!("REJECTED {}  {}  {}", code, context_id, reason),
        ScanOutcome::QueuedOffline {
            code, context_id, ..
        } => format!("QUEUED   {}  {}  (pending sync)", code, context_id),
    }
}

impl ScanEventEmitter for ConsoleEmitter {
    fn emit_scan_result(&self, outcome: &ScanOutcome) {
        match self.format {
            OutputFormat::Text => println!("{}", describe(outcome)),
            OutputFormat::Json => match serde_json::to_value(outcome) {
                Ok(value) => self.print_json("checkin://scan", value),
                Err(e) => warn!(error = %e, "Failed to serialize scan outcome"),
            },
        }
    }

    fn emit_queue_status(&self, status: &QueueStatus) {
        match self.format {
            OutputFormat::Text => {
                if status.stuck > 0 {
                    println!(
                        "         {} pending sync, {} not going through",
                        status.pending, status.stuck
                    );
                } else if !status.is_empty() {
                    println!("         {} pending sync", status.pending);
                }
            }
            OutputFormat::Json => match serde_json::to_value(status) {
                Ok(value) => self.print_json("checkin://queue", value),
                Err(e) => warn!(error = %e, "Failed to serialize queue status"),
            },
        }
    }

    fn emit_capture_state(&self, state: CaptureState) {
        match self.format {
            OutputFormat::Text => {
                if state == CaptureState::Error {
                    println!("Camera stopped working. Manual entry still works.");
                }
            }
            OutputFormat::Json => self.print_json("checkin://capture", json!(state)),
        }
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        match self.format {
            OutputFormat::Text => println!("ERROR    {}", message),
            OutputFormat::Json => self.print_json(
                "checkin://error",
                json!({ "message": message, "retryable": retryable }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkin_core::CheckInRecord;

    #[test]
    fn test_describe_outcomes() {
        let accepted = ScanOutcome::Accepted {
            code: "EVT-42".into(),
            context_id: "session-7".into(),
            origin: SubmissionOrigin::Replay,
            record: CheckInRecord::default(),
        };
        assert!(describe(&accepted).starts_with("SYNCED"));

        let rejected = ScanOutcome::Rejected {
            code: "EVT-42".into(),
            context_id: "session-7".into(),
            origin: SubmissionOrigin::Live,
            reason: "ALREADY_CHECKED_IN".into(),
        };
        assert!(describe(&rejected).ends_with("ALREADY_CHECKED_IN"));

        let queued = ScanOutcome::QueuedOffline {
            code: "EVT-42".into(),
            context_id: "session-7".into(),
            entry_id: "e1".into(),
        };
        assert!(describe(&queued).contains("pending sync"));
    }
}
