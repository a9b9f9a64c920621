//! # Scan Event Emitter
//!
//! Outbound notifications for whatever UI hosts the engine (console,
//! desktop shell, kiosk screen).
//!
//! ```text
//! pipeline / replayer / agent ──► ScanEventEmitter
//!                                   ├── emit_scan_result   "checkin://scan"
//!                                   ├── emit_queue_status  "checkin://queue"
//!                                   ├── emit_capture_state "checkin://capture"
//!                                   └── emit_error         "checkin://error"
//! ```
//!
//! Implementations must not block: they are called from the submission
//! and replay paths.

use checkin_core::{CaptureState, QueueStatus, ScanOutcome};

/// Trait for emitting scanner events.
pub trait ScanEventEmitter: Send + Sync {
    /// A scan (live or replayed) reached a final or queued outcome.
    fn emit_scan_result(&self, outcome: &ScanOutcome);

    /// The offline queue changed.
    fn emit_queue_status(&self, status: &QueueStatus);

    /// The camera session changed state.
    fn emit_capture_state(&self, state: CaptureState);

    /// Something the operator should see that is not a scan outcome.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl ScanEventEmitter for NoOpEmitter {
    fn emit_scan_result(&self, _outcome: &ScanOutcome) {}
    fn emit_queue_status(&self, _status: &QueueStatus) {}
    fn emit_capture_state(&self, _state: CaptureState) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}
