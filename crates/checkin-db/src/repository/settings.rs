//! # Device Settings Repository
//!
//! Small key/value store for values that belong to this installation and
//! must outlive the process, such as the generated device identifier.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Key under which the device identifier is stored.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Repository for `device_settings`.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM device_settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Inserts or overwrites a value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(key = %key, "Setting stored");
        Ok(())
    }

    /// Returns the stored value, storing `make()` first if the key is absent.
    ///
    /// Two racing callers both end up with whichever value won the insert.
    pub async fn get_or_insert_with<F>(&self, key: &str, make: F) -> DbResult<String>
    where
        F: FnOnce() -> String,
    {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO device_settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(key)
        .bind(make())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get(key)
            .await?
            .ok_or_else(|| DbError::not_found("Setting", key))
    }
}
