//! # Scan Queue Repository
//!
//! Durable FIFO of scans the check-in service has not confirmed yet.
//!
//! ## Queue Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Offline Scan Queue                                  │
//! │                                                                         │
//! │  submit() hits a transient failure                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue(payload) ── INSERT, seq = AUTOINCREMENT ──► row on disk       │
//! │       │                                                                 │
//! │       ▼   (only now is "queued offline" shown to the operator)         │
//! │                                                                         │
//! │  REPLAY PASS                                                           │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  peek_all()  ── ORDER BY seq ASC                                │   │
//! │  │     │                                                           │   │
//! │  │     ├── accepted  ──► remove(id)                                │   │
//! │  │     ├── rejected  ──► settle_rejected(entry, reason)            │   │
//! │  │     │                 (log row + delete in ONE transaction)     │   │
//! │  │     └── transient ──► record_failed_attempt(id), pass halts     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Entries survive restarts (SQLite, synchronous = FULL)               │
//! │  • Replay order is insertion order, ids are never reused               │
//! │  • An entry leaves the queue only on a definitive answer               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use checkin_core::{QueueEntry, QueueStatus, RejectionRecord, ScanPayload};

/// Raw `scan_queue` row.
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    seq: i64,
    id: String,
    code: String,
    context_id: String,
    device_id: String,
    scanned_at: DateTime<Utc>,
    enqueued_at: DateTime<Utc>,
    attempt_count: i64,
    last_error: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = DbError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let payload = ScanPayload::new(&row.code, &row.context_id, &row.device_id, row.scanned_at)
            .map_err(|e| DbError::corrupt("scan_queue", format!("entry {}: {}", row.id, e)))?;

        Ok(QueueEntry {
            id: row.id,
            seq: row.seq,
            payload,
            enqueued_at: row.enqueued_at,
            attempt_count: u32::try_from(row.attempt_count).unwrap_or(u32::MAX),
            last_error: row.last_error,
            last_attempt_at: row.last_attempt_at,
        })
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT seq, id, code, context_id, device_id, scanned_at,
           enqueued_at, attempt_count, last_error, last_attempt_at
    FROM scan_queue
"#;

/// Repository for the offline scan queue.
#[derive(Debug, Clone)]
pub struct ScanQueueRepository {
    pool: SqlitePool,
}

impl ScanQueueRepository {
    /// Creates a new ScanQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ScanQueueRepository { pool }
    }

    /// Appends a payload to the tail of the queue.
    ///
    /// The returned entry is already committed; callers may tell the
    /// operator the scan is queued.
    pub async fn enqueue(&self, payload: &ScanPayload) -> DbResult<QueueEntry> {
        let id = Uuid::new_v4().to_string();
        let enqueued_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO scan_queue (
                id, code, context_id, device_id, scanned_at, enqueued_at, attempt_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            "#,
        )
        .bind(&id)
        .bind(payload.code())
        .bind(payload.context_id())
        .bind(payload.device_id())
        .bind(payload.scanned_at())
        .bind(enqueued_at)
        .execute(&self.pool)
        .await?;

        let seq = result.last_insert_rowid();

        debug!(
            entry_id = %id,
            seq,
            code = %payload.code(),
            context_id = %payload.context_id(),
            "Scan enqueued"
        );

        Ok(QueueEntry {
            id,
            seq,
            payload: payload.clone(),
            enqueued_at,
            attempt_count: 0,
            last_error: None,
            last_attempt_at: None,
        })
    }

    /// Returns every pending entry, oldest first.
    pub async fn peek_all(&self) -> DbResult<Vec<QueueEntry>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!("{SELECT_ENTRY} ORDER BY seq ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QueueEntry::try_from).collect()
    }

    /// Looks up a single entry by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<QueueEntry>> {
        let row: Option<QueueRow> = sqlx::query_as(&format!("{SELECT_ENTRY} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueueEntry::try_from).transpose()
    }

    /// Removes an entry after a definitive answer.
    ///
    /// Returns `false` if the entry was already gone (e.g. cleared by the
    /// operator mid-pass).
    pub async fn remove(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM scan_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(entry_id = %id, removed = result.rows_affected() > 0, "Queue entry removed");

        Ok(result.rows_affected() > 0)
    }

    /// Records a failed replay attempt. The entry stays at its position.
    ///
    /// Returns the entry with its updated attempt count.
    pub async fn record_failed_attempt(&self, id: &str, reason: &str) -> DbResult<QueueEntry> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE scan_queue SET
                attempt_count = attempt_count + 1,
                last_error = ?2,
                last_attempt_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("QueueEntry", id));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("QueueEntry", id))
    }

    /// Moves a rejected entry into the rejection log.
    ///
    /// Insert and delete happen in one transaction, so a crash can neither
    /// lose the rejection nor replay the entry a second time.
    pub async fn settle_rejected(
        &self,
        entry: &QueueEntry,
        reason: &str,
    ) -> DbResult<RejectionRecord> {
        let rejected_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO replay_rejections (
                entry_id, code, context_id, device_id, scanned_at, reason, rejected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.payload.code())
        .bind(entry.payload.context_id())
        .bind(entry.payload.device_id())
        .bind(entry.payload.scanned_at())
        .bind(reason)
        .bind(rejected_at)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM scan_queue WHERE id = ?1")
            .bind(&entry.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if deleted.rows_affected() == 0 {
            warn!(entry_id = %entry.id, "Rejected entry was no longer queued");
        }

        Ok(RejectionRecord {
            id: result.last_insert_rowid(),
            entry_id: entry.id.clone(),
            code: entry.payload.code().to_string(),
            context_id: entry.payload.context_id().to_string(),
            device_id: entry.payload.device_id().to_string(),
            scanned_at: entry.payload.scanned_at(),
            reason: reason.to_string(),
            rejected_at,
        })
    }

    /// Counts pending entries.
    pub async fn count_pending(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// Builds a status snapshot.
    ///
    /// `stuck_threshold` of zero reports no entry as stuck.
    pub async fn status(&self, stuck_threshold: u32) -> DbResult<QueueStatus> {
        let pending = self.count_pending().await?;

        let stuck = if stuck_threshold == 0 {
            0
        } else {
            let stuck: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM scan_queue WHERE attempt_count >= ?1")
                    .bind(i64::from(stuck_threshold))
                    .fetch_one(&self.pool)
                    .await?;
            stuck.max(0) as u64
        };

        let oldest_enqueued_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT enqueued_at FROM scan_queue ORDER BY seq ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(QueueStatus {
            pending,
            stuck,
            oldest_enqueued_at,
        })
    }

    /// Drops every pending entry. Returns the number removed.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM scan_queue")
            .execute(&self.pool)
            .await?;

        warn!(removed = result.rows_affected(), "Offline queue cleared");

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn payload(code: &str) -> ScanPayload {
        ScanPayload::new(code, "session-7", "device-1", Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_and_peek_in_order() {
        let db = test_db().await;
        let queue = db.scan_queue();

        let a = queue.enqueue(&payload("A")).await.unwrap();
        let b = queue.enqueue(&payload("B")).await.unwrap();
        let c = queue.enqueue(&payload("C")).await.unwrap();
        assert!(a.seq < b.seq && b.seq < c.seq);

        let entries = queue.peek_all().await.unwrap();
        let codes: Vec<_> = entries.iter().map(|e| e.payload.code()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
        assert_eq!(entries[0].attempt_count, 0);
        assert_eq!(entries[0].payload, a.payload);
    }

    #[tokio::test]
    async fn test_payload_round_trips_unchanged() {
        let db = test_db().await;
        let queue = db.scan_queue();
        let original = payload("EVT-42");

        let entry = queue.enqueue(&original).await.unwrap();
        let stored = queue.get(&entry.id).await.unwrap().unwrap();

        assert_eq!(stored.payload.code(), original.code());
        assert_eq!(stored.payload.context_id(), original.context_id());
        assert_eq!(stored.payload.device_id(), original.device_id());
        assert_eq!(stored.payload.scanned_at(), original.scanned_at());
    }

    #[tokio::test]
    async fn test_remove() {
        let db = test_db().await;
        let queue = db.scan_queue();

        let a = queue.enqueue(&payload("A")).await.unwrap();
        queue.enqueue(&payload("B")).await.unwrap();

        assert!(queue.remove(&a.id).await.unwrap());
        assert!(!queue.remove(&a.id).await.unwrap());
        assert!(queue.get(&a.id).await.unwrap().is_none());

        let entries = queue.peek_all().await.unwrap();
        assert_eq!(entries[0].payload.code(), "B");
        assert_eq!(queue.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sequence_not_reused_after_removal() {
        let db = test_db().await;
        let queue = db.scan_queue();

        let a = queue.enqueue(&payload("A")).await.unwrap();
        queue.remove(&a.id).await.unwrap();
        let b = queue.enqueue(&payload("B")).await.unwrap();

        assert!(b.seq > a.seq);
    }

    #[tokio::test]
    async fn test_record_failed_attempt_keeps_position() {
        let db = test_db().await;
        let queue = db.scan_queue();

        let a = queue.enqueue(&payload("A")).await.unwrap();
        queue.enqueue(&payload("B")).await.unwrap();

        let first = queue.record_failed_attempt(&a.id, "timeout").await.unwrap();
        assert_eq!(first.attempt_count, 1);
        queue.record_failed_attempt(&a.id, "HTTP 503").await.unwrap();

        let head = queue.peek_all().await.unwrap().remove(0);
        assert_eq!(head.id, a.id);
        assert_eq!(head.attempt_count, 2);
        assert_eq!(head.last_error.as_deref(), Some("HTTP 503"));
        assert!(head.last_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_record_failed_attempt_unknown_entry() {
        let db = test_db().await;

        let err = db
            .scan_queue()
            .record_failed_attempt("missing", "timeout")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_settle_rejected_moves_entry_to_log() {
        let db = test_db().await;
        let queue = db.scan_queue();

        let a = queue.enqueue(&payload("A")).await.unwrap();
        let record = queue.settle_rejected(&a, "already checked in").await.unwrap();

        assert_eq!(record.entry_id, a.id);
        assert_eq!(record.code, "A");
        assert_eq!(queue.count_pending().await.unwrap(), 0);

        let log = db.rejections().recent(10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].reason, "already checked in");
    }

    #[tokio::test]
    async fn test_status() {
        let db = test_db().await;
        let queue = db.scan_queue();

        assert!(queue.status(3).await.unwrap().is_empty());

        let a = queue.enqueue(&payload("A")).await.unwrap();
        queue.enqueue(&payload("B")).await.unwrap();
        for _ in 0..3 {
            queue.record_failed_attempt(&a.id, "timeout").await.unwrap();
        }

        let status = queue.status(3).await.unwrap();
        assert_eq!(status.pending, 2);
        assert_eq!(status.stuck, 1);
        assert_eq!(status.oldest_enqueued_at, Some(a.enqueued_at));

        assert_eq!(queue.status(0).await.unwrap().stuck, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let db = test_db().await;
        let queue = db.scan_queue();

        queue.enqueue(&payload("A")).await.unwrap();
        queue.enqueue(&payload("B")).await.unwrap();

        assert_eq!(queue.clear().await.unwrap(), 2);
        assert!(queue.peek_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.db");

        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            db.scan_queue().enqueue(&payload("A")).await.unwrap();
            db.scan_queue().enqueue(&payload("B")).await.unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let entries = db.scan_queue().peek_all().await.unwrap();
        let codes: Vec<_> = entries.iter().map(|e| e.payload.code()).collect();
        assert_eq!(codes, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_enqueue_on_closed_database_fails() {
        let db = test_db().await;
        db.close().await;

        let err = db.scan_queue().enqueue(&payload("A")).await.unwrap_err();
        assert!(err.is_storage_failure());
    }
}
