//! # Settlement Forwarding
//!
//! Drains the settlement outbox to the source system.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Settlement Forwarding                                │
//! │                                                                         │
//! │  finalize() ──► Settlement ──► outbox.queue()                           │
//! │                                     │                                   │
//! │  SettlementForwarder::drain()       ▼                                   │
//! │    1. outbox.get_pending(batch_size)                                    │
//! │    2. skip entries past MAX_DELIVERY_ATTEMPTS                           │
//! │    3. sink.deliver(settlement)                                          │
//! │         ok  ──► mark_sent                                               │
//! │         err ──► mark_failed (attempts += 1, last_error)                 │
//! │                                                                         │
//! │  SettlementForwarder::prune() ──► cleanup_sent(retention_days)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed delivery stays queued for the next drain. The local finalize is
//! never undone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use picking_core::Settlement;
use picking_db::{SettlementOutboxEntry, SettlementOutboxRepository};

use crate::config::SettlementSettings;
use crate::error::{SettlementError, SettlementResult};

/// Entries that failed this many times are left for an operator.
pub const MAX_DELIVERY_ATTEMPTS: i64 = 10;

// =============================================================================
// Sink
// =============================================================================

/// Where settlements are delivered.
#[async_trait]
pub trait SettlementSink: Send + Sync {
    async fn deliver(&self, settlement: &Settlement) -> SettlementResult<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Posts the source-system payload (`acao: dar_baixa`) as JSON.
#[derive(Debug, Clone)]
pub struct HttpSettlementSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSettlementSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> SettlementResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpSettlementSink {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Builds the sink from `[settlement]`, or `None` without an endpoint.
    pub fn from_settings(settings: &SettlementSettings) -> SettlementResult<Option<Self>> {
        match settings.endpoint {
            Some(ref endpoint) => Ok(Some(Self::new(
                endpoint.clone(),
                Duration::from_secs(settings.timeout_secs),
            )?)),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SettlementSink for HttpSettlementSink {
    async fn deliver(&self, settlement: &Settlement) -> SettlementResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&settlement.to_source_payload())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SettlementError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(
            manifest_id = %settlement.manifest_id,
            status = status.as_u16(),
            "Settlement accepted"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// =============================================================================
// Forwarder
// =============================================================================

/// Outcome of one [`SettlementForwarder::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
    /// Entries past [`MAX_DELIVERY_ATTEMPTS`], not retried.
    pub skipped: usize,
}

/// Forwards queued settlements through a [`SettlementSink`].
pub struct SettlementForwarder {
    outbox: SettlementOutboxRepository,
    sink: Arc<dyn SettlementSink>,
    batch_size: u32,
}

impl std::fmt::Debug for SettlementForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementForwarder")
            .field("sink", &self.sink.name())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl SettlementForwarder {
    pub fn new(
        outbox: SettlementOutboxRepository,
        sink: Arc<dyn SettlementSink>,
        batch_size: u32,
    ) -> Self {
        SettlementForwarder {
            outbox,
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Delivers one batch of pending settlements, oldest first.
    ///
    /// ## Errors
    /// Only outbox reads fail the drain. Delivery failures are recorded on
    /// the entry and counted in the report.
    pub async fn drain(&self) -> SettlementResult<DrainReport> {
        let entries = self.outbox.get_pending(self.batch_size).await?;
        let mut report = DrainReport::default();

        if entries.is_empty() {
            debug!("No pending settlements");
            return Ok(report);
        }

        info!(count = entries.len(), sink = self.sink.name(), "Forwarding settlements");

        for entry in entries {
            if entry.attempts >= MAX_DELIVERY_ATTEMPTS {
                warn!(
                    id = %entry.id,
                    manifest_id = %entry.manifest_id,
                    attempts = entry.attempts,
                    "Skipping settlement that exceeded max delivery attempts"
                );
                report.skipped += 1;
                continue;
            }

            match self.forward(&entry).await {
                Ok(()) => {
                    self.outbox.mark_sent(&entry.id).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    if let Err(mark_err) = self.outbox.mark_failed(&entry.id, &e.to_string()).await {
                        error!(?mark_err, id = %entry.id, "Failed to record delivery failure");
                    }
                    report.failed += 1;
                }
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            "Settlement drain finished"
        );
        Ok(report)
    }

    async fn forward(&self, entry: &SettlementOutboxEntry) -> SettlementResult<()> {
        let settlement = entry.settlement()?;
        self.sink.deliver(&settlement).await
    }

    /// Deletes delivered entries older than `retention_days`.
    pub async fn prune(&self, retention_days: u32) -> SettlementResult<u64> {
        let deleted = self.outbox.cleanup_sent(retention_days).await?;
        if deleted > 0 {
            info!(deleted, retention_days, "Pruned delivered settlements");
        }
        Ok(deleted)
    }

    /// Entries still waiting for delivery.
    pub async fn pending(&self) -> SettlementResult<i64> {
        Ok(self.outbox.count_pending().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use picking_core::{ItemStatus, SettlementLine};
    use picking_db::{Database, DbConfig};
    use std::sync::Mutex;

    /// Records deliveries and rejects the listed manifests.
    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        reject: Vec<String>,
    }

    #[async_trait]
    impl SettlementSink for RecordingSink {
        async fn deliver(&self, settlement: &Settlement) -> SettlementResult<()> {
            if self.reject.contains(&settlement.manifest_id) {
                return Err(SettlementError::Rejected { status: 502 });
            }
            self.delivered
                .lock()
                .unwrap()
                .push(settlement.manifest_id.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn settlement(record_id: &str, manifest_id: &str) -> Settlement {
        Settlement {
            record_id: record_id.to_string(),
            manifest_id: manifest_id.to_string(),
            finished_at: Utc::now(),
            lines: vec![SettlementLine {
                code: "P-1".to_string(),
                barcode: "7891234567890".to_string(),
                quantity: 3,
                status: ItemStatus::Complete,
            }],
        }
    }

    #[tokio::test]
    async fn test_drain_marks_sent_and_failed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settlements().queue(&settlement("rec-1", "CTRC-1")).await.unwrap();
        let failing = db.settlements().queue(&settlement("rec-2", "CTRC-2")).await.unwrap();

        let sink = Arc::new(RecordingSink {
            reject: vec!["CTRC-2".to_string()],
            ..Default::default()
        });
        let forwarder = SettlementForwarder::new(db.settlements(), sink.clone(), 20);

        let report = forwarder.drain().await.unwrap();
        assert_eq!(
            report,
            DrainReport {
                sent: 1,
                failed: 1,
                skipped: 0
            }
        );
        assert_eq!(*sink.delivered.lock().unwrap(), vec!["CTRC-1".to_string()]);

        // Failed entry stays queued with its error
        assert_eq!(forwarder.pending().await.unwrap(), 1);
        let stored = db.settlements().get_by_id(&failing.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.unwrap().contains("502"));
    }

    #[tokio::test]
    async fn test_drain_retries_until_delivered() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settlements().queue(&settlement("rec-1", "CTRC-1")).await.unwrap();

        let down = Arc::new(RecordingSink {
            reject: vec!["CTRC-1".to_string()],
            ..Default::default()
        });
        let report = SettlementForwarder::new(db.settlements(), down, 20)
            .drain()
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        let up = Arc::new(RecordingSink::default());
        let forwarder = SettlementForwarder::new(db.settlements(), up.clone(), 20);
        assert_eq!(forwarder.drain().await.unwrap().sent, 1);
        assert_eq!(forwarder.pending().await.unwrap(), 0);

        // Nothing left to send
        assert_eq!(forwarder.drain().await.unwrap(), DrainReport::default());
        assert_eq!(up.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_entries_are_skipped() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let entry = db.settlements().queue(&settlement("rec-1", "CTRC-1")).await.unwrap();
        for _ in 0..MAX_DELIVERY_ATTEMPTS {
            db.settlements().mark_failed(&entry.id, "HTTP 500").await.unwrap();
        }

        let sink = Arc::new(RecordingSink::default());
        let forwarder = SettlementForwarder::new(db.settlements(), sink.clone(), 20);

        let report = forwarder.drain().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_deliveries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settlements().queue(&settlement("rec-1", "CTRC-1")).await.unwrap();

        let forwarder =
            SettlementForwarder::new(db.settlements(), Arc::new(RecordingSink::default()), 20);
        forwarder.drain().await.unwrap();

        assert_eq!(forwarder.prune(30).await.unwrap(), 0);
    }

    #[test]
    fn test_http_sink_requires_endpoint() {
        let settings = SettlementSettings::default();
        assert!(HttpSettlementSink::from_settings(&settings).unwrap().is_none());

        let settings = SettlementSettings {
            endpoint: Some("https://example.com/webhook/picking-process".into()),
            ..Default::default()
        };
        let sink = HttpSettlementSink::from_settings(&settings).unwrap().unwrap();
        assert_eq!(sink.endpoint(), "https://example.com/webhook/picking-process");
    }
}
