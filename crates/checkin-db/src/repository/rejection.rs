//! # Rejection Log Repository
//!
//! Read side of `replay_rejections`: queued scans that the service refused
//! during replay. Rows are written by
//! [`ScanQueueRepository::settle_rejected`](super::scan_queue::ScanQueueRepository::settle_rejected).

use sqlx::SqlitePool;

use crate::error::DbResult;
use checkin_core::RejectionRecord;

/// Repository for the replay rejection log.
#[derive(Debug, Clone)]
pub struct RejectionRepository {
    pool: SqlitePool,
}

impl RejectionRepository {
    /// Creates a new RejectionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RejectionRepository { pool }
    }

    /// Most recent rejections first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<RejectionRecord>> {
        let records = sqlx::query_as::<_, RejectionRecord>(
            r#"
            SELECT id, entry_id, code, context_id, device_id,
                   scanned_at, reason, rejected_at
            FROM replay_rejections
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM replay_rejections")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use checkin_core::ScanPayload;

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = db.scan_queue();

        for code in ["A", "B", "C"] {
            let payload = ScanPayload::new(code, "session-7", "device-1", Utc::now()).unwrap();
            let entry = queue.enqueue(&payload).await.unwrap();
            queue.settle_rejected(&entry, "unknown code").await.unwrap();
        }

        let recent = db.rejections().recent(2).await.unwrap();
        let codes: Vec<_> = recent.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["C", "B"]);
        assert_eq!(db.rejections().count().await.unwrap(), 3);
    }
}
