//! # Shared Session
//!
//! Serialized access to one [`PickingManager`] from many tasks.
//!
//! ## Thread Safety
//! The manager is wrapped in `Arc<tokio::sync::Mutex<T>>` because:
//! 1. Scans come from an input task while the UI reads snapshots
//! 2. A scan must run to completion, checkpoint included, before the next
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Shared Session Operations                            │
//! │                                                                         │
//! │  Scanner task ──────► scan(token) ───────► lock ─► match/mutate/persist │
//! │                                                                         │
//! │  Operator prompt ───► confirm_pending() ─► lock ─► registry + item      │
//! │                                                                         │
//! │  UI refresh ────────► with_session() ────► lock ─► snapshot (read only) │
//! │                                                                         │
//! │  The lock is held across the checkpoint write, so two scans never      │
//! │  interleave.                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use picking_core::{LineItem, ManifestInput, PickingRecord, SessionView};

use crate::error::SessionResult;
use crate::manager::{PickingManager, ScanOutcome};

/// Cloneable handle to a mutex-guarded [`PickingManager`].
#[derive(Debug, Clone)]
pub struct SharedSession {
    manager: Arc<Mutex<PickingManager>>,
}

impl SharedSession {
    pub fn new(manager: PickingManager) -> Self {
        SharedSession {
            manager: Arc::new(Mutex::new(manager)),
        }
    }

    /// Executes a function with read access to the manager.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let phase = shared.with_session(|m| m.phase()).await;
    /// ```
    pub async fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&PickingManager) -> R,
    {
        let manager = self.manager.lock().await;
        f(&manager)
    }

    /// Executes a function with write access to the manager.
    ///
    /// For synchronous operations such as `cancel_confirmation` or
    /// `subscribe`. Async operations go through [`SharedSession::lock`] or
    /// the forwarding methods below.
    pub async fn with_session_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut PickingManager) -> R,
    {
        let mut manager = self.manager.lock().await;
        f(&mut manager)
    }

    /// Exclusive access for a sequence of operations.
    pub async fn lock(&self) -> MutexGuard<'_, PickingManager> {
        self.manager.lock().await
    }

    // =========================================================================
    // Forwarding
    // =========================================================================

    pub async fn load_manifest(&self, input: ManifestInput) -> SessionResult<SessionView> {
        self.manager.lock().await.load_manifest(input).await
    }

    pub async fn scan(&self, token: &str) -> ScanOutcome {
        self.manager.lock().await.scan(token).await
    }

    pub async fn confirm_pending(&self, input: &str) -> SessionResult<(usize, u32)> {
        self.manager.lock().await.confirm_pending(input).await
    }

    pub async fn adjust_manually(&self, line: usize, delta: i64) -> SessionResult<LineItem> {
        self.manager.lock().await.adjust_manually(line, delta).await
    }

    pub async fn finalize(&self) -> SessionResult<PickingRecord> {
        self.manager.lock().await.finalize().await
    }

    pub async fn abandon(&self) -> bool {
        self.manager.lock().await.abandon().await
    }

    pub async fn snapshot(&self) -> Option<SessionView> {
        self.with_session(PickingManager::snapshot).await
    }
}
