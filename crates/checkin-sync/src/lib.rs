//! # checkin-sync: Capture, Submission and Replay Engine
//!
//! This crate turns camera frames and typed codes into check-ins and keeps
//! them safe while the device is offline.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Check-In Engine Architecture                      │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  CheckInAgent (Main Orchestrator)                │  │
//! │  │                                                                  │  │
//! │  │  Built once at startup, driven by the console or a UI shell     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  CaptureLoop   │  │  Submission    │  │   QueueReplayer        │    │
//! │  │                │  │  Pipeline      │  │                        │    │
//! │  │ Camera stream  │  │ Validate, stamp│  │ Ordered resubmission   │    │
//! │  │ decode tick    │  │ submit, queue  │  │ halts on transient     │    │
//! │  │ 2 s cool-down  │  │ on transient   │  │ failure                │    │
//! │  └────────────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │                              │                       │                  │
//! │                              ▼                       ▼                  │
//! │                    ┌──────────────────────────────────────────┐        │
//! │                    │  checkin-db: scan_queue (SQLite, WAL)     │        │
//! │                    └──────────────────────────────────────────┘        │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │ HttpSubmitter  │  │ DeviceIdentity         │    │
//! │  │ Monitor+probe  │  │ (reqwest)      │  │ (persisted UUID)       │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  EVENTS (to UI via ScanEventEmitter):                                  │
//! │  • "checkin://scan" - Accepted / Rejected / QueuedOffline              │
//! │  • "checkin://queue" - Pending and stuck counts                        │
//! │  • "checkin://capture" - Camera state                                  │
//! │  • "checkin://error" - Camera, persistence and sync failures           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - Main `CheckInAgent` orchestrator and builder
//! - [`capture`] - Camera session and decode loop
//! - [`config`] - Scanner configuration (TOML + environment)
//! - [`connectivity`] - Online/offline state and reachability probe
//! - [`emitter`] - Event sink for the UI
//! - [`error`] - Engine error types
//! - [`identity`] - Device identifier
//! - [`pipeline`] - Live submission with offline fallback
//! - [`replayer`] - Ordered replay of the offline queue
//! - [`submitter`] - Check-in service client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkin_sync::{CheckInAgentBuilder, CheckInConfig};
//! use checkin_db::{Database, DbConfig};
//!
//! let config = CheckInConfig::load(None)?;
//! let db = Database::new(DbConfig::new("scanner.db")).await?;
//!
//! let mut agent = CheckInAgentBuilder::new(config)
//!     .with_database(db)
//!     .build()
//!     .await?;
//! agent.start().await?;
//!
//! let outcome = agent.submit_manual_code("EVT-42", "session-7").await?;
//! println!("{}", outcome.label());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod capture;
pub mod config;
pub mod connectivity;
pub mod emitter;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod replayer;
pub mod submitter;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{CheckInAgent, CheckInAgentBuilder};
pub use capture::{
    CameraError, CameraFacing, CameraSource, CaptureConstraints, CaptureLoop, DecodedScan,
    Decoder, FrameBuffer, FrameError, NullDecoder, UnavailableCamera, VideoStream,
};
pub use config::CheckInConfig;
pub use connectivity::{ConnectivityEvents, ConnectivityMonitor, ReachabilityProbe};
pub use emitter::{NoOpEmitter, ScanEventEmitter};
pub use error::{CheckInError, CheckInResult};
pub use identity::DeviceIdentity;
pub use pipeline::SubmissionPipeline;
pub use replayer::{QueueReplayer, ReplayReport, ReplayRun, ReplayTrigger};
pub use submitter::{CheckInSubmitter, HttpSubmitter, SubmitResponse};
