//! # Checkpoint Repository
//!
//! Key-value rows holding JSON checkpoints: the active session, the history
//! and the units-per-container registry each live under their own key.
//!
//! Every write is one `INSERT ... ON CONFLICT DO UPDATE` statement, so a
//! crash leaves either the old value or the new one, never a mix, and the
//! keys never depend on each other.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for checkpoint rows.
#[derive(Debug, Clone)]
pub struct CheckpointRepository {
    pool: SqlitePool,
}

impl CheckpointRepository {
    /// Creates a new CheckpointRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CheckpointRepository { pool }
    }

    /// Reads the value stored under `key`.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM checkpoints WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Writes `value` under `key`, replacing any previous value.
    pub async fn put(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, bytes = value.len(), "Writing checkpoint");

        sqlx::query(
            r#"
            INSERT INTO checkpoints (key, value, updated_at)
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

        Ok(())
    }

    /// Removes `key`. Returns false when nothing was stored.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        debug!(key = %key, removed = result.rows_affected(), "Deleted checkpoint");
        Ok(result.rows_affected() > 0)
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> DbResult<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM checkpoints ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.checkpoints();

        assert_eq!(repo.get("picking_progress").await.unwrap(), None);

        repo.put("picking_progress", r#"{"a":1}"#).await.unwrap();
        repo.put("picking_progress", r#"{"a":2}"#).await.unwrap();

        assert_eq!(
            repo.get("picking_progress").await.unwrap().as_deref(),
            Some(r#"{"a":2}"#)
        );
        assert_eq!(repo.keys().await.unwrap(), vec!["picking_progress"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.checkpoints();

        repo.put("picking_history", "[]").await.unwrap();
        repo.put("picking_units_per_container", "{}").await.unwrap();

        assert!(repo.delete("picking_history").await.unwrap());
        assert!(!repo.delete("picking_history").await.unwrap());

        // Other keys untouched
        assert_eq!(
            repo.get("picking_units_per_container").await.unwrap().as_deref(),
            Some("{}")
        );
    }
}
