//! # Queue Replayer
//!
//! Resubmits queued scans once the service is reachable again.
//!
//! ## Replay Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        QueueReplayer::replay                            │
//! │                                                                         │
//! │  trigger: Offline → Online edge │ manual "sync now"                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pass lock held? ── yes ──► AlreadyRunning (no second pass)            │
//! │       │             replay_after_current() waits for it instead        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  peek_all()  (ascending seq)                                           │
//! │       │                                                                 │
//! │       ▼   for each entry, one at a time, stored payload unchanged      │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  submit(entry.payload)                                          │   │
//! │  │    ├── Accepted ──► remove(entry)            ──► next entry     │   │
//! │  │    ├── Rejected ──► settle_rejected(entry)   ──► next entry     │   │
//! │  │    │                (rejection log + remove, one transaction)   │   │
//! │  │    └── Transient ─► record_failed_attempt   ──► HALT            │   │
//! │  │                     entry keeps its place, later entries wait   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  emit queue status, return ReplayReport                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are retried without limit. Once an entry has failed
//! `stuck_after_attempts` times it is counted as stuck in the queue status
//! and logged at warn level on every further failure.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use checkin_core::{QueueEntry, ScanOutcome, SubmissionOrigin};
use checkin_db::ScanQueueRepository;

use crate::emitter::ScanEventEmitter;
use crate::error::CheckInResult;
use crate::submitter::{CheckInSubmitter, SubmitResponse};

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayTrigger {
    OnlineEdge,
    Manual,
}

impl fmt::Display for ReplayTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayTrigger::OnlineEdge => write!(f, "online_edge"),
            ReplayTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries submitted during the pass.
    pub attempted: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// The pass stopped at a transient failure.
    pub halted: bool,
    /// Entries still queued when the pass ended.
    pub remaining: u64,
}

/// Result of asking for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayRun {
    Completed(ReplayReport),
    /// Another pass was in progress; nothing was submitted.
    AlreadyRunning,
}

impl ReplayRun {
    pub fn report(&self) -> Option<&ReplayReport> {
        match self {
            ReplayRun::Completed(report) => Some(report),
            ReplayRun::AlreadyRunning => None,
        }
    }
}

/// Drains the offline queue in order. Clones share the pass lock.
#[derive(Clone)]
pub struct QueueReplayer {
    submitter: Arc<dyn CheckInSubmitter>,
    queue: ScanQueueRepository,
    emitter: Arc<dyn ScanEventEmitter>,
    stuck_threshold: u32,
    pass_lock: Arc<Mutex<()>>,
}

impl QueueReplayer {
    pub fn new(
        submitter: Arc<dyn CheckInSubmitter>,
        queue: ScanQueueRepository,
        emitter: Arc<dyn ScanEventEmitter>,
        stuck_threshold: u32,
    ) -> Self {
        QueueReplayer {
            submitter,
            queue,
            emitter,
            stuck_threshold,
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one pass unless one is already running.
    pub async fn replay(&self, trigger: ReplayTrigger) -> CheckInResult<ReplayRun> {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!(trigger = %trigger, "Replay pass already running");
            return Ok(ReplayRun::AlreadyRunning);
        };

        self.run_pass(trigger).await.map(ReplayRun::Completed)
    }

    /// Waits for a running pass to finish, then runs a fresh one.
    ///
    /// Used for online edges that arrive mid-pass: entries the running pass
    /// already gave up on get another attempt.
    pub async fn replay_after_current(
        &self,
        trigger: ReplayTrigger,
    ) -> CheckInResult<ReplayReport> {
        let _guard = self.pass_lock.lock().await;
        self.run_pass(trigger).await
    }

    async fn run_pass(&self, trigger: ReplayTrigger) -> CheckInResult<ReplayReport> {
        let entries = self.queue.peek_all().await?;
        if entries.is_empty() {
            debug!(trigger = %trigger, "Nothing to replay");
            return Ok(ReplayReport::default());
        }

        info!(trigger = %trigger, pending = entries.len(), "Replay pass starting");

        let mut report = ReplayReport::default();
        for entry in entries {
            report.attempted += 1;

            if !self.replay_entry(&entry, &mut report).await? {
                report.halted = true;
                break;
            }
        }

        let status = self.queue.status(self.stuck_threshold).await?;
        report.remaining = status.pending;
        self.emitter.emit_queue_status(&status);

        info!(
            trigger = %trigger,
            attempted = report.attempted,
            accepted = report.accepted,
            rejected = report.rejected,
            halted = report.halted,
            remaining = report.remaining,
            "Replay pass finished"
        );

        Ok(report)
    }

    /// Returns false when the pass must stop at this entry.
    async fn replay_entry(
        &self,
        entry: &QueueEntry,
        report: &mut ReplayReport,
    ) -> CheckInResult<bool> {
        let payload = &entry.payload;

        match self.submitter.submit(payload).await {
            SubmitResponse::Accepted(record) => {
                self.queue.remove(&entry.id).await?;
                report.accepted += 1;
                debug!(entry_id = %entry.id, code = %payload.code(), "Replayed check-in accepted");

                self.emitter.emit_scan_result(&ScanOutcome::Accepted {
                    code: payload.code().to_string(),
                    context_id: payload.context_id().to_string(),
                    origin: SubmissionOrigin::Replay,
                    record,
                });
                Ok(true)
            }

            SubmitResponse::Rejected(reason) => {
                self.queue.settle_rejected(entry, &reason).await?;
                report.rejected += 1;
                warn!(
                    entry_id = %entry.id,
                    code = %payload.code(),
                    reason = %reason,
                    "Replayed check-in rejected"
                );

                self.emitter.emit_scan_result(&ScanOutcome::Rejected {
                    code: payload.code().to_string(),
                    context_id: payload.context_id().to_string(),
                    origin: SubmissionOrigin::Replay,
                    reason,
                });
                Ok(true)
            }

            SubmitResponse::TransientFailure(reason) => {
                let updated = self.queue.record_failed_attempt(&entry.id, &reason).await?;
                let attempts = updated.attempt_count;

                if updated.is_stuck(self.stuck_threshold) {
                    warn!(
                        entry_id = %entry.id,
                        code = %payload.code(),
                        attempts,
                        reason = %reason,
                        "Queued scan keeps failing"
                    );
                } else {
                    debug!(entry_id = %entry.id, attempts, reason = %reason, "Replay halted");
                }
                Ok(false)
            }
        }
    }
}
