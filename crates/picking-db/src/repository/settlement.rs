//! # Settlement Outbox Repository
//!
//! Holds finalized pickings until they have been forwarded to the source
//! system.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Settlement Outbox                                    │
//! │                                                                         │
//! │  finalize() succeeds locally                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO settlement_outbox (record_id, payload, ...)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  FORWARDER (caller owned)                                       │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT ... WHERE sent_at IS NULL ORDER BY created_at        │   │
//! │  │  2. For each entry:                                             │   │
//! │  │     a. POST payload to the source system                        │   │
//! │  │     b. On success: mark_sent                                    │   │
//! │  │     c. On failure: mark_failed (attempts += 1, last_error)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  A failed send never rolls back the local finalize.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use picking_core::Settlement;

/// One queued settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettlementOutboxEntry {
    pub id: String,
    /// The picking record this settlement came from. Unique.
    pub record_id: String,
    pub manifest_id: String,
    /// Serialized [`Settlement`].
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl SettlementOutboxEntry {
    /// Decodes the stored payload.
    pub fn settlement(&self) -> DbResult<Settlement> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Repository for settlement outbox operations.
#[derive(Debug, Clone)]
pub struct SettlementOutboxRepository {
    pool: SqlitePool,
}

impl SettlementOutboxRepository {
    /// Creates a new SettlementOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettlementOutboxRepository { pool }
    }

    /// Queues a settlement for forwarding.
    ///
    /// Queuing the same record twice fails with `UniqueViolation`.
    pub async fn queue(&self, settlement: &Settlement) -> DbResult<SettlementOutboxEntry> {
        let entry = SettlementOutboxEntry {
            id: Uuid::new_v4().to_string(),
            record_id: settlement.record_id.clone(),
            manifest_id: settlement.manifest_id.clone(),
            payload: serde_json::to_string(settlement)?,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            sent_at: None,
        };

        debug!(
            record_id = %entry.record_id,
            manifest_id = %entry.manifest_id,
            "Queuing settlement"
        );

        sqlx::query(
            r#"
            INSERT INTO settlement_outbox (
                id, record_id, manifest_id, payload,
                attempts, last_error, created_at, attempted_at, sent_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.record_id)
        .bind(&entry.manifest_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Entry by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SettlementOutboxEntry>> {
        let entry = sqlx::query_as::<_, SettlementOutboxEntry>(
            r#"
            SELECT id, record_id, manifest_id, payload, attempts, last_error,
                   created_at, attempted_at, sent_at
            FROM settlement_outbox
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Entries not yet sent, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<SettlementOutboxEntry>> {
        let entries = sqlx::query_as::<_, SettlementOutboxEntry>(
            r#"
            SELECT id, record_id, manifest_id, payload, attempts, last_error,
                   created_at, attempted_at, sent_at
            FROM settlement_outbox
            WHERE sent_at IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as delivered.
    pub async fn mark_sent(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE settlement_outbox SET
                sent_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Settlement", id));
        }

        debug!(id = %id, "Settlement sent");
        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE settlement_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Settlement", id));
        }

        warn!(id = %id, error = %error, "Settlement delivery failed");
        Ok(())
    }

    /// Counts entries not yet sent.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settlement_outbox WHERE sent_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes entries sent more than `days_old` days ago.
    ///
    /// Returns the number of deleted entries.
    pub async fn cleanup_sent(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            r#"
            DELETE FROM settlement_outbox
            WHERE sent_at IS NOT NULL
            AND sent_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use picking_core::{ItemStatus, SettlementLine};

    fn settlement(record_id: &str) -> Settlement {
        Settlement {
            record_id: record_id.to_string(),
            manifest_id: "CTRC-1".to_string(),
            finished_at: Utc::now(),
            lines: vec![SettlementLine {
                code: "P-1".to_string(),
                barcode: "7891234567890".to_string(),
                quantity: 5,
                status: ItemStatus::Complete,
            }],
        }
    }

    #[tokio::test]
    async fn test_queue_and_get_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.settlements();

        let entry = repo.queue(&settlement("rec-1")).await.unwrap();
        repo.queue(&settlement("rec-2")).await.unwrap();

        let pending = repo.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].record_id, "rec-1");
        assert_eq!(repo.count_pending().await.unwrap(), 2);

        let decoded = pending[0].settlement().unwrap();
        assert_eq!(decoded.lines[0].quantity, 5);

        repo.mark_sent(&entry.id).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 1);

        let stored = repo.get_by_id(&entry.id).await.unwrap().unwrap();
        assert!(stored.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_failed_increments_attempts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.settlements();

        let entry = repo.queue(&settlement("rec-1")).await.unwrap();
        repo.mark_failed(&entry.id, "HTTP 502").await.unwrap();
        repo.mark_failed(&entry.id, "HTTP 503").await.unwrap();

        let stored = repo.get_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("HTTP 503"));
        assert!(stored.sent_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_record_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.settlements();

        repo.queue(&settlement("rec-1")).await.unwrap();
        let err = repo.queue(&settlement("rec-1")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_mark_unknown_entry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.settlements().mark_sent("missing").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.settlements();

        let entry = repo.queue(&settlement("rec-1")).await.unwrap();
        repo.mark_sent(&entry.id).await.unwrap();

        assert_eq!(repo.cleanup_sent(30).await.unwrap(), 0);
        assert!(repo.get_by_id(&entry.id).await.unwrap().is_some());
    }
}
