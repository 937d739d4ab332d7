//! # Session Events
//!
//! Notifications for the presentation layer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Event Flow                                           │
//! │                                                                         │
//! │  PickingManager::scan()                                                 │
//! │       │ mutate → persist                                                │
//! │       ▼                                                                 │
//! │  EventBus::emit(ItemScanned)  ──►  subscriber 1 (UnboundedReceiver)     │
//! │  EventBus::emit(SessionUpdated) ─► subscriber 2 ...                     │
//! │                                                                         │
//! │  Events are sent in mutation order. A dropped receiver is pruned on     │
//! │  the next emit; the manager never waits on a subscriber.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;
use ts_rs::TS;

use picking_core::barcode::MatchStage;
use picking_core::{LineItem, PickingRecord, SessionView};

/// Why a scan was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ScanErrorKind {
    MalformedCode,
    NotFound,
    QuantityExceeded,
    /// Dropped while a container prompt was open.
    AwaitingConfirmation,
    NoActiveSession,
}

impl std::fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanErrorKind::MalformedCode => write!(f, "malformed_code"),
            ScanErrorKind::NotFound => write!(f, "not_found"),
            ScanErrorKind::QuantityExceeded => write!(f, "quantity_exceeded"),
            ScanErrorKind::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            ScanErrorKind::NoActiveSession => write!(f, "no_active_session"),
        }
    }
}

/// A notification from the [`PickingManager`](crate::PickingManager).
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Fresh snapshot after any session mutation.
    SessionUpdated { view: SessionView },

    /// A scan incremented a line.
    ItemScanned {
        item: LineItem,
        increment: i64,
        stage: MatchStage,
    },

    /// An operator corrected a line by hand, bypassing the matcher.
    ItemAdjusted { item: LineItem, delta: i64 },

    /// A scan was rejected.
    ScanError { kind: ScanErrorKind, detail: String },

    /// A picking was finalized and recorded in the history.
    Finalized { record: PickingRecord },

    /// The active session was discarded without finalizing.
    Abandoned { manifest_id: String },

    /// A checkpoint write failed. In-memory state is still current.
    PersistenceWarning { key: String, detail: String },
}

impl SessionEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionUpdated { .. } => "session_updated",
            SessionEvent::ItemScanned { .. } => "item_scanned",
            SessionEvent::ItemAdjusted { .. } => "item_adjusted",
            SessionEvent::ScanError { .. } => "scan_error",
            SessionEvent::Finalized { .. } => "finalized",
            SessionEvent::Abandoned { .. } => "abandoned",
            SessionEvent::PersistenceWarning { .. } => "persistence_warning",
        }
    }
}

/// Fan-out of [`SessionEvent`]s to channel subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<UnboundedSender<SessionEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. It receives every event emitted afterwards.
    pub fn subscribe(&mut self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sends `event` to every live subscriber, dropping closed ones.
    pub fn emit(&mut self, event: SessionEvent) {
        trace!(event = event.name(), subscribers = self.subscribers.len(), "Emitting event");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
