//! # checkin-core: Pure Domain Model for the Check-In Scanner
//!
//! This crate holds every type that crosses a component boundary in the
//! scanner: scan payloads, queue entries, outcomes and the two small state
//! machines (capture and connectivity). It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Check-In Scanner Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/scanner (console)                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        checkin-sync: capture loop, pipeline, replayer           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ checkin-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │ validation│  │   error   │                  │   │
//! │  │   │ Payload   │  │  codes    │  │ CoreError │                  │   │
//! │  │   │ Outcome   │  │  ids      │  │           │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO CAMERA                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               checkin-db: SQLite offline queue                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (ScanPayload, QueueEntry, ScanOutcome, ...)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use checkin_core::ScanPayload;
//!
//! let payload = ScanPayload::new("EVT-42\n", "session-7", "device-1", Utc::now()).unwrap();
//! assert_eq!(payload.code(), "EVT-42");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default interval between decode attempts while capture is active.
pub const DEFAULT_DECODE_INTERVAL_MS: u64 = 500;

/// Default pause after a successful decode.
///
/// A code held in front of the camera decodes on every tick; the cool-down
/// turns one physical presentation into one scan.
pub const DEFAULT_COOLDOWN_MS: u64 = 2000;

/// Target capture width. Chosen for decode latency, not fidelity.
pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;

/// Target capture height.
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;

/// Longest code accepted from the decoder or keyboard.
pub const MAX_CODE_LENGTH: usize = 512;

/// Longest context or device identifier accepted.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Replay attempts after which an entry is reported as stuck.
pub const DEFAULT_STUCK_AFTER_ATTEMPTS: u32 = 10;
