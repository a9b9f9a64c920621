//! # Repository Module
//!
//! Database repository implementations for the check-in scanner.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  checkin-sync (pipeline / replayer / agent)                            │
//! │       │                                                                 │
//! │       │  db.scan_queue().enqueue(&payload)                             │
//! │       ▼                                                                 │
//! │  ScanQueueRepository        RejectionRepository   SettingsRepository   │
//! │  ├── enqueue                ├── recent            ├── get              │
//! │  ├── peek_all / get         └── count             ├── set              │
//! │  ├── remove                                       └── get_or_insert_with│
//! │  ├── record_failed_attempt                                             │
//! │  ├── settle_rejected                                                   │
//! │  └── status / clear                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod rejection;
pub mod scan_queue;
pub mod settings;
