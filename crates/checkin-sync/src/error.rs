//! # Check-In Error Types
//!
//! Error types for the capture, submission and replay engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Check-In Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Camera      │  │     Submission          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  CameraUnavail. │  │  Validation             │ │
//! │  │  MissingDeviceId│  │  PermissionDen. │  │  Http                   │ │
//! │  │  InvalidUrl     │  │  CaptureState   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Persistence   │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  QueuePersist.  │  │  ChannelError   │                              │
//! │  │  DatabaseError  │  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transient network failures and service rejections are *outcomes*, not
//! errors: they are carried by [`SubmitResponse`](crate::submitter::SubmitResponse)
//! and [`ScanOutcome`](checkin_core::ScanOutcome).

use thiserror::Error;

use checkin_core::{CoreError, ValidationError};

/// Result type alias for engine operations.
pub type CheckInResult<T> = Result<T, CheckInError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum CheckInError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device ID could not be determined.
    #[error("Device ID not configured and could not be generated")]
    MissingDeviceId,

    /// Invalid service URL.
    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Camera Errors
    // =========================================================================
    /// No usable camera. Terminal for the capture session.
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Camera access refused. Terminal for the capture session.
    #[error("Camera permission denied")]
    PermissionDenied,

    /// Capture state machine refused the request.
    #[error("Capture state error: {0}")]
    CaptureState(String),

    // =========================================================================
    // Submission Errors
    // =========================================================================
    /// The code or context failed validation. Nothing was sent or stored.
    #[error("Invalid scan: {0}")]
    Validation(#[from] ValidationError),

    /// HTTP client could not be built or a request could not be formed.
    #[error("HTTP error: {0}")]
    Http(String),

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// A scan could not be written to the offline queue.
    ///
    /// The scan is lost unless the operator retries; it must be shown as
    /// failed, never as queued.
    #[error("Could not store scan offline: {0}")]
    QueuePersistence(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Agent is shutting down.
    #[error("Check-in agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<checkin_db::DbError> for CheckInError {
    fn from(err: checkin_db::DbError) -> Self {
        CheckInError::DatabaseError(err.to_string())
    }
}

impl From<CoreError> for CheckInError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => CheckInError::Validation(v),
            other => CheckInError::CaptureState(other.to_string()),
        }
    }
}

impl From<url::ParseError> for CheckInError {
    fn from(err: url::ParseError) -> Self {
        CheckInError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for CheckInError {
    fn from(err: reqwest::Error) -> Self {
        CheckInError::Http(err.to_string())
    }
}

impl From<std::io::Error> for CheckInError {
    fn from(err: std::io::Error) -> Self {
        CheckInError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for CheckInError {
    fn from(err: toml::de::Error) -> Self {
        CheckInError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for CheckInError {
    fn from(err: toml::ser::Error) -> Self {
        CheckInError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl CheckInError {
    /// Returns true if the operator can usefully try the same action again.
    ///
    /// ## Retryable
    /// - Queue persistence (disk freed, storage remounted)
    /// - Database and HTTP client hiccups
    ///
    /// ## Not Retryable
    /// - Configuration errors
    /// - Validation errors (same input, same result)
    /// - Camera unavailable / permission denied (needs operator action)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckInError::QueuePersistence(_)
                | CheckInError::DatabaseError(_)
                | CheckInError::Http(_)
                | CheckInError::ChannelError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CheckInError::InvalidConfig(_)
                | CheckInError::MissingDeviceId
                | CheckInError::InvalidUrl(_)
                | CheckInError::ConfigLoadFailed(_)
                | CheckInError::ConfigSaveFailed(_)
        )
    }

    /// Returns true for camera failures that end the capture session.
    pub fn is_camera_error(&self) -> bool {
        matches!(
            self,
            CheckInError::CameraUnavailable(_) | CheckInError::PermissionDenied
        )
    }
}
