//! # Submission Pipeline
//!
//! One code in, one [`ScanOutcome`] out. Camera scans and manual entry take
//! the same path.
//!
//! ## Submission Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SubmissionPipeline::submit                         │
//! │                                                                         │
//! │  (code, context_id, source)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ScanPayload::new(code, context, device_id, now) ──invalid──► Err      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  submitter.submit(&payload)                                            │
//! │       │                                                                 │
//! │       ├── Accepted(record) ───────────► Accepted { origin: Live }       │
//! │       ├── Rejected(reason) ───────────► Rejected { origin: Live }       │
//! │       └── TransientFailure                                              │
//! │              │                                                          │
//! │              ▼                                                          │
//! │        scan_queue.enqueue(&payload)                                     │
//! │              ├── ok ──────────────────► QueuedOffline { entry_id }      │
//! │              │                          + queue status                  │
//! │              └── err ─────────────────► Err(QueuePersistence)           │
//! │                                         never reported as queued        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pipeline holds no mutable state; clones can submit concurrently.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use checkin_core::{ScanOutcome, ScanPayload, ScanSource, SubmissionOrigin};
use checkin_db::ScanQueueRepository;

use crate::emitter::ScanEventEmitter;
use crate::error::{CheckInError, CheckInResult};
use crate::identity::DeviceIdentity;
use crate::submitter::{CheckInSubmitter, SubmitResponse};

/// Validates, submits and, when the service cannot be reached, queues.
#[derive(Clone)]
pub struct SubmissionPipeline {
    submitter: Arc<dyn CheckInSubmitter>,
    queue: ScanQueueRepository,
    identity: DeviceIdentity,
    emitter: Arc<dyn ScanEventEmitter>,
    stuck_threshold: u32,
}

impl SubmissionPipeline {
    pub fn new(
        submitter: Arc<dyn CheckInSubmitter>,
        queue: ScanQueueRepository,
        identity: DeviceIdentity,
        emitter: Arc<dyn ScanEventEmitter>,
        stuck_threshold: u32,
    ) -> Self {
        SubmissionPipeline {
            submitter,
            queue,
            identity,
            emitter,
            stuck_threshold,
        }
    }

    /// Submits a freshly scanned or typed code.
    ///
    /// `scanned_at` is stamped here and never changes afterwards, including
    /// on replay.
    pub async fn submit(
        &self,
        code: &str,
        context_id: &str,
        source: ScanSource,
    ) -> CheckInResult<ScanOutcome> {
        let payload = ScanPayload::new(code, context_id, self.identity.as_str(), Utc::now())
            .map_err(|e| {
                debug!(source = %source, error = %e, "Scan input rejected");
                CheckInError::Validation(e)
            })?;

        debug!(
            code = %payload.code(),
            context_id = %payload.context_id(),
            source = %source,
            "Submitting check-in"
        );

        self.submit_payload(payload).await
    }

    /// Submits an already built payload.
    pub async fn submit_payload(&self, payload: ScanPayload) -> CheckInResult<ScanOutcome> {
        let outcome = match self.submitter.submit(&payload).await {
            SubmitResponse::Accepted(record) => {
                info!(code = %payload.code(), context_id = %payload.context_id(), "Check-in accepted");
                ScanOutcome::Accepted {
                    code: payload.code().to_string(),
                    context_id: payload.context_id().to_string(),
                    origin: SubmissionOrigin::Live,
                    record,
                }
            }

            SubmitResponse::Rejected(reason) => {
                info!(code = %payload.code(), reason = %reason, "Check-in rejected");
                ScanOutcome::Rejected {
                    code: payload.code().to_string(),
                    context_id: payload.context_id().to_string(),
                    origin: SubmissionOrigin::Live,
                    reason,
                }
            }

            SubmitResponse::TransientFailure(reason) => {
                warn!(code = %payload.code(), reason = %reason, "Service unreachable, queueing scan");
                return self.enqueue(payload).await;
            }
        };

        self.emitter.emit_scan_result(&outcome);
        Ok(outcome)
    }

    async fn enqueue(&self, payload: ScanPayload) -> CheckInResult<ScanOutcome> {
        let entry = match self.queue.enqueue(&payload).await {
            Ok(entry) => entry,
            Err(e) => {
                error!(code = %payload.code(), error = %e, "Failed to persist scan");
                let message = format!("Scan {} could not be saved: {}", payload.code(), e);
                self.emitter.emit_error(&message, true);
                return Err(CheckInError::QueuePersistence(e.to_string()));
            }
        };

        info!(code = %payload.code(), entry_id = %entry.id, seq = entry.seq, "Scan queued offline");

        let outcome = ScanOutcome::QueuedOffline {
            code: payload.code().to_string(),
            context_id: payload.context_id().to_string(),
            entry_id: entry.id,
        };
        self.emitter.emit_scan_result(&outcome);

        match self.queue.status(self.stuck_threshold).await {
            Ok(status) => self.emitter.emit_queue_status(&status),
            Err(e) => warn!(error = %e, "Failed to read queue status"),
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_db, test_identity, RecordingEmitter, ScriptedSubmitter};
    use checkin_db::Database;

    async fn pipeline(
        submitter: Arc<ScriptedSubmitter>,
    ) -> (SubmissionPipeline, Database, Arc<RecordingEmitter>) {
        let db = test_db().await;
        let emitter = Arc::new(RecordingEmitter::default());
        let pipeline = SubmissionPipeline::new(
            submitter,
            db.scan_queue(),
            test_identity(),
            emitter.clone(),
            10,
        );
        (pipeline, db, emitter)
    }

    #[tokio::test]
    async fn test_online_accept_queues_nothing() {
        let submitter = Arc::new(ScriptedSubmitter::accepting());
        let (pipeline, db, emitter) = pipeline(submitter.clone()).await;

        let outcome = pipeline
            .submit("EVT-42", "session-7", ScanSource::Camera)
            .await
            .unwrap();

        assert!(outcome.is_accepted());
        assert_eq!(db.scan_queue().count_pending().await.unwrap(), 0);
        assert_eq!(emitter.outcomes(), vec![outcome]);

        let sent = submitter.calls();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device_id(), "device-1");
        assert_eq!(sent[0].context_id(), "session-7");
    }

    #[tokio::test]
    async fn test_rejection_is_not_queued() {
        let submitter = Arc::new(ScriptedSubmitter::accepting());
        submitter.push(SubmitResponse::Rejected("ALREADY_CHECKED_IN".into()));
        let (pipeline, db, emitter) = pipeline(submitter).await;

        let outcome = pipeline
            .submit("EVT-42", "session-7", ScanSource::Camera)
            .await
            .unwrap();

        match &outcome {
            ScanOutcome::Rejected { reason, origin, .. } => {
                assert_eq!(reason, "ALREADY_CHECKED_IN");
                assert_eq!(*origin, SubmissionOrigin::Live);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(db.scan_queue().count_pending().await.unwrap(), 0);
        assert!(emitter.outcomes()[0].is_rejected());
    }

    #[tokio::test]
    async fn test_transient_failure_queues_exactly_once() {
        let submitter = Arc::new(ScriptedSubmitter::offline());
        let (pipeline, db, emitter) = pipeline(submitter).await;

        let outcome = pipeline
            .submit("EVT-42", "session-7", ScanSource::Camera)
            .await
            .unwrap();

        let ScanOutcome::QueuedOffline { entry_id, .. } = &outcome else {
            panic!("expected queued outcome, got {:?}", outcome);
        };

        let entries = db.scan_queue().peek_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(&entries[0].id, entry_id);
        assert_eq!(entries[0].attempt_count, 0);
        assert_eq!(entries[0].payload.code(), "EVT-42");

        assert_eq!(emitter.last_status().map(|s| s.pending), Some(1));
    }

    #[tokio::test]
    async fn test_invalid_code_never_reaches_submitter() {
        let submitter = Arc::new(ScriptedSubmitter::accepting());
        let (pipeline, _db, emitter) = pipeline(submitter.clone()).await;

        let err = pipeline
            .submit("   ", "session-7", ScanSource::Manual)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckInError::Validation(_)));
        assert!(submitter.calls().is_empty());
        assert!(emitter.outcomes().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_reported_as_queued() {
        let submitter = Arc::new(ScriptedSubmitter::offline());
        let (pipeline, db, emitter) = pipeline(submitter).await;
        db.close().await;

        let err = pipeline
            .submit("EVT-42", "session-7", ScanSource::Camera)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckInError::QueuePersistence(_)));
        assert!(emitter.outcomes().is_empty());
        let errors = emitter.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].0.contains("EVT-42"));
    }

    #[tokio::test]
    async fn test_concurrent_submissions() {
        let submitter = Arc::new(ScriptedSubmitter::offline());
        let (pipeline, db, _emitter) = pipeline(submitter).await;

        let mut tasks = Vec::new();
        for i in 0..5 {
            let pipeline = pipeline.clone();
            tasks.push(tokio::spawn(async move {
                pipeline
                    .submit(&format!("EVT-{}", i), "session-7", ScanSource::Camera)
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_queued());
        }

        assert_eq!(db.scan_queue().count_pending().await.unwrap(), 5);
    }
}
