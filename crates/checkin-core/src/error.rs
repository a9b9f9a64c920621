//! # Error Types
//!
//! Domain-specific error types for checkin-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  checkin-core errors (this file)                                       │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  checkin-db errors (separate crate)                                    │
//! │  └── DbError          - Queue persistence failures                     │
//! │                                                                         │
//! │  checkin-sync errors (separate crate)                                  │
//! │  └── CheckInError     - What the operator console sees                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CheckInError → Console            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The capture state machine was asked for a move it does not allow.
    ///
    /// ## When This Occurs
    /// - `start()` while a session is already Starting or Active
    /// - Jumping from Idle straight to Active without acquiring a stream
    #[error("Invalid capture transition: {from} -> {to}")]
    InvalidCaptureTransition { from: String, to: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before anything is sent or stored: a payload that fails here is
/// never queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g. control characters in a code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
