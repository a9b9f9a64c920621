//! # checkin-db: Durable Storage for the Check-In Scanner
//!
//! This crate owns everything the scanner must remember across restarts:
//! the offline scan queue, the log of scans rejected during replay, and the
//! device settings. It uses SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Check-In Scanner Data Flow                         │
//! │                                                                         │
//! │  Submission pipeline (transient failure)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    checkin-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ ScanQueueRepo  │   │ 001_init.sql │   │   │
//! │  │   │ SqlitePool    │◄───│ RejectionRepo  │   │              │   │   │
//! │  │   │               │    │ SettingsRepo   │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   <data dir>/com.checkin.scanner/scanner.db                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkin_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/scanner.db")).await?;
//!
//! let entry = db.scan_queue().enqueue(&payload).await?;
//! for entry in db.scan_queue().peek_all().await? {
//!     // replay...
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::rejection::RejectionRepository;
pub use repository::scan_queue::ScanQueueRepository;
pub use repository::settings::{SettingsRepository, DEVICE_ID_KEY};
