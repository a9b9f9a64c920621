//! # Domain Types
//!
//! Core domain types used throughout the check-in scanner.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ScanPayload    │   │   QueueEntry    │   │ CheckInRecord   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  code           │◄──│  payload        │   │  id             │       │
//! │  │  context_id     │   │  id / seq       │   │  attendee_name  │       │
//! │  │  device_id      │   │  enqueued_at    │   │  checked_in_at  │       │
//! │  │  scanned_at     │   │  attempt_count  │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ScanOutcome    │   │  CaptureState   │   │ConnectivityState│       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Accepted       │   │  Idle           │   │  Online         │       │
//! │  │  Rejected       │   │  Starting       │   │  Offline        │       │
//! │  │  QueuedOffline  │   │  Active / Error │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::validation::{validate_code, validate_context_id, validate_device_id, ValidationResult};

// =============================================================================
// Scan Payload
// =============================================================================

/// One attempted check-in.
///
/// `code` and `context_id` cannot change after construction and `scanned_at`
/// is stamped exactly once, by whoever builds the payload. Fields are private
/// so the only way in is [`ScanPayload::new`] (or deserialization of a payload
/// that was already built once).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ScanPayload {
    code: String,
    context_id: String,
    device_id: String,
    #[ts(as = "String")]
    scanned_at: DateTime<Utc>,
}

impl ScanPayload {
    /// Builds a payload from raw input.
    ///
    /// `code` and `context_id` are trimmed and validated; an empty code is
    /// never a valid scan.
    pub fn new(
        code: &str,
        context_id: &str,
        device_id: &str,
        scanned_at: DateTime<Utc>,
    ) -> ValidationResult<Self> {
        let code = validate_code(code)?;
        let context_id = validate_context_id(context_id)?;
        let device_id = validate_device_id(device_id)?;

        Ok(ScanPayload {
            code,
            context_id,
            device_id,
            scanned_at,
        })
    }

    /// Decoded content of the scan.
    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Event or session the scan applies to.
    #[inline]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Identifier of the scanning device.
    #[inline]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Device-local time of the scan.
    #[inline]
    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.scanned_at
    }
}

// =============================================================================
// Queue Entry
// =============================================================================

/// A payload waiting in the offline queue.
///
/// ## Lifecycle
/// ```text
/// submit() ── transient failure ──► enqueue (attempt_count = 0)
///                                        │
///            ┌───────────────────────────┤ replay pass
///            ▼                           ▼
///   transient again:              accepted / rejected:
///   attempt_count += 1            entry removed
///   pass halts here
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Stable identity used by `remove` (UUID v4).
    pub id: String,

    /// Insertion sequence. Replay order is ascending `seq`.
    pub seq: i64,

    /// The scan exactly as it was first built.
    pub payload: ScanPayload,

    /// When the entry entered the queue.
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,

    /// Number of failed replay attempts.
    pub attempt_count: u32,

    /// Reason recorded for the last failed replay.
    pub last_error: Option<String>,

    /// When replay last attempted this entry.
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Returns true once the entry has failed `threshold` replays or more.
    ///
    /// A threshold of zero disables the check.
    pub fn is_stuck(&self, threshold: u32) -> bool {
        threshold > 0 && self.attempt_count >= threshold
    }
}

// =============================================================================
// Check-In Record
// =============================================================================

/// The check-in record acknowledged by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRecord {
    /// Server-side identifier, when the service returns one.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub context_id: String,

    /// Display name of the attendee, if the service shares it.
    #[serde(default)]
    pub attendee_name: Option<String>,

    /// Server time of the check-in.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl CheckInRecord {
    /// Minimal record for an acknowledgement whose body carried no details.
    pub fn acknowledged(payload: &ScanPayload) -> Self {
        CheckInRecord {
            id: None,
            code: payload.code().to_string(),
            context_id: payload.context_id().to_string(),
            attendee_name: None,
            checked_in_at: None,
        }
    }
}

// =============================================================================
// Scan Outcome
// =============================================================================

/// Where a submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOrigin {
    /// First attempt, straight from a scan or manual entry.
    Live,
    /// Resubmission of a queued entry.
    Replay,
}

/// How a code reached the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    Camera,
    Manual,
}

impl std::fmt::Display for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanSource::Camera => write!(f, "camera"),
            ScanSource::Manual => write!(f, "manual"),
        }
    }
}

/// Result of one scan, as shown to the operator.
///
/// ## Serialization
/// ```json
/// { "status": "queued_offline", "code": "EVT-42", "contextId": "session-7", "entryId": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The service confirmed the check-in.
    #[serde(rename_all = "camelCase")]
    Accepted {
        code: String,
        context_id: String,
        origin: SubmissionOrigin,
        record: CheckInRecord,
    },

    /// The service refused the check-in for a business reason.
    #[serde(rename_all = "camelCase")]
    Rejected {
        code: String,
        context_id: String,
        origin: SubmissionOrigin,
        reason: String,
    },

    /// Stored locally; will be confirmed once the service is reachable.
    #[serde(rename_all = "camelCase")]
    QueuedOffline {
        code: String,
        context_id: String,
        entry_id: String,
    },
}

impl ScanOutcome {
    /// The scanned code this outcome belongs to.
    pub fn code(&self) -> &str {
        match self {
            ScanOutcome::Accepted { code, .. }
            | ScanOutcome::Rejected { code, .. }
            | ScanOutcome::QueuedOffline { code, .. } => code,
        }
    }

    pub fn context_id(&self) -> &str {
        match self {
            ScanOutcome::Accepted { context_id, .. }
            | ScanOutcome::Rejected { context_id, .. }
            | ScanOutcome::QueuedOffline { context_id, .. } => context_id,
        }
    }

    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanOutcome::Accepted { .. })
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        matches!(self, ScanOutcome::Rejected { .. })
    }

    #[inline]
    pub fn is_queued(&self) -> bool {
        matches!(self, ScanOutcome::QueuedOffline { .. })
    }

    /// Short label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            ScanOutcome::Accepted { .. } => "accepted",
            ScanOutcome::Rejected { .. } => "rejected",
            ScanOutcome::QueuedOffline { .. } => "queued_offline",
        }
    }
}

// =============================================================================
// Queue Status
// =============================================================================

/// Snapshot of the offline queue for a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Entries waiting for confirmation.
    pub pending: u64,

    /// Entries that reached the configured attempt threshold.
    pub stuck: u64,

    /// Enqueue time of the oldest pending entry.
    #[ts(as = "Option<String>")]
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

impl QueueStatus {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }
}

// =============================================================================
// Rejection Record
// =============================================================================

/// A queued scan that the service rejected during replay.
///
/// Kept for operator visibility because the scan no longer shows up in the
/// queue once it is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRecord {
    pub id: i64,
    pub entry_id: String,
    pub code: String,
    pub context_id: String,
    pub device_id: String,
    #[ts(as = "String")]
    pub scanned_at: DateTime<Utc>,
    pub reason: String,
    #[ts(as = "String")]
    pub rejected_at: DateTime<Utc>,
}

// =============================================================================
// Capture State
// =============================================================================

/// State of the camera capture session.
///
/// ## Transitions
/// ```text
///            start()                acquire ok
///   Idle ─────────────► Starting ─────────────► Active
///    ▲  ▲                  │                      │
///    │  │  acquire failed  ▼      stream ended    │
///    │  └──────────────  Error ◄──────────────────┤
///    │       start()       │                      │
///    └──────── stop() ─────┴──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Active,
    Error,
}

impl CaptureState {
    /// Validates a state transition.
    pub fn transition(self, to: CaptureState) -> CoreResult<CaptureState> {
        use CaptureState::*;

        let allowed = match (self, to) {
            (Idle | Error, Starting) => true,
            (Starting, Active | Error) => true,
            (Active, Error) => true,
            // stop() is valid from anywhere
            (_, Idle) => true,
            _ => false,
        };

        if allowed {
            Ok(to)
        } else {
            Err(CoreError::InvalidCaptureTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "idle"),
            CaptureState::Starting => write!(f, "starting"),
            CaptureState::Active => write!(f, "active"),
            CaptureState::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Connectivity State
// =============================================================================

/// Best-effort connectivity as reported by the platform.
///
/// This only decides *when* replay is attempted. Submissions themselves are
/// the authoritative reachability test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    #[default]
    Offline,
}

impl ConnectivityState {
    #[inline]
    pub fn from_online(online: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }

    #[inline]
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(code: &str) -> ScanPayload {
        ScanPayload::new(code, "session-7", "device-1", Utc::now()).unwrap()
    }

    #[test]
    fn test_payload_trims_input() {
        let p = ScanPayload::new("  EVT-42\r\n", " session-7 ", "device-1", Utc::now()).unwrap();
        assert_eq!(p.code(), "EVT-42");
        assert_eq!(p.context_id(), "session-7");
    }

    #[test]
    fn test_payload_rejects_empty_code() {
        assert!(ScanPayload::new("", "session-7", "device-1", Utc::now()).is_err());
        assert!(ScanPayload::new("   ", "session-7", "device-1", Utc::now()).is_err());
        assert!(ScanPayload::new("EVT-42", "", "device-1", Utc::now()).is_err());
    }

    #[test]
    fn test_payload_wire_format_is_camel_case() {
        let json = serde_json::to_value(payload("EVT-42")).unwrap();
        assert_eq!(json["code"], "EVT-42");
        assert_eq!(json["contextId"], "session-7");
        assert_eq!(json["deviceId"], "device-1");
        assert!(json.get("scannedAt").is_some());
    }

    #[test]
    fn test_outcome_serialization_tag() {
        let outcome = ScanOutcome::QueuedOffline {
            code: "EVT-42".into(),
            context_id: "session-7".into(),
            entry_id: "abc".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "queued_offline");
        assert_eq!(json["contextId"], "session-7");
        assert_eq!(json["entryId"], "abc");
        assert_eq!(outcome.label(), "queued_offline");
        assert!(outcome.is_queued());
    }

    #[test]
    fn test_record_parses_sparse_body() {
        let record: CheckInRecord = serde_json::from_str(r#"{"id":"ci-1"}"#).unwrap();
        assert_eq!(record.id.as_deref(), Some("ci-1"));
        assert!(record.attendee_name.is_none());
    }

    #[test]
    fn test_queue_entry_stuck_threshold() {
        let mut entry = QueueEntry {
            id: "e1".into(),
            seq: 1,
            payload: payload("A"),
            enqueued_at: Utc::now(),
            attempt_count: 9,
            last_error: None,
            last_attempt_at: None,
        };
        assert!(!entry.is_stuck(10));
        entry.attempt_count = 10;
        assert!(entry.is_stuck(10));
        assert!(!entry.is_stuck(0));
    }

    #[test]
    fn test_capture_transitions() {
        use CaptureState::*;
        assert_eq!(Idle.transition(Starting).unwrap(), Starting);
        assert_eq!(Starting.transition(Active).unwrap(), Active);
        assert_eq!(Starting.transition(Error).unwrap(), Error);
        assert_eq!(Error.transition(Starting).unwrap(), Starting);
        assert_eq!(Active.transition(Idle).unwrap(), Idle);

        assert!(Idle.transition(Active).is_err());
        assert!(Active.transition(Starting).is_err());
        assert!(Starting.transition(Starting).is_err());
    }

    #[test]
    fn test_connectivity_state() {
        assert!(ConnectivityState::from_online(true).is_online());
        assert_eq!(ConnectivityState::default(), ConnectivityState::Offline);
        assert_eq!(ConnectivityState::Online.to_string(), "online");
    }
}
