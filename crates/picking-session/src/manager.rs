//! # Picking Manager
//!
//! The stateful half of the picking core: owns the active session, the
//! units-per-container registry and the history, and runs every scan
//! through match → business rules → mutate → checkpoint → notify.
//!
//! ## Session Phases
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Session Lifecycle                                    │
//! │                                                                         │
//! │            load_manifest()          scan() / adjust_manually()         │
//! │   ┌───────┐ ───────────► ┌────────┐ ─────────────────► ┌────────────┐  │
//! │   │ EMPTY │              │ LOADED │                    │ IN PROGRESS│  │
//! │   └───────┘ ◄─────────── └────────┘                    └────────────┘  │
//! │       ▲        abandon()                                     │         │
//! │       │                                                      │         │
//! │       │  abandon()                                finalize() │         │
//! │       ├──────────────────────────────────────────────────────┤         │
//! │       │                                                      ▼         │
//! │       │          load_manifest()                      ┌───────────┐    │
//! │       └─────────────────────────────────────────────  │ FINALIZED │    │
//! │                                                       └───────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scan Cycle
//! ```text
//! token ──► validate ──► resolve (cascade) ──► "UN" without count?
//!              │              │                    │ registry hit: fill in
//!              ▼              ▼                    │ miss: NeedsContainerConfirmation
//!        MalformedCode     NotFound                ▼
//!                                           already complete? ──► QuantityExceeded
//!                                                  │
//!                                                  ▼
//!                                increment, stamp, checkpoint, notify ──► Scanned
//! ```
//!
//! Rejected scans never mutate quantities. Checkpoint failures are reported
//! as [`SessionEvent::PersistenceWarning`] and never undo an in-memory
//! change.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use ts_rs::TS;

use picking_core::barcode::{self, MatchOptions, MatchStage};
use picking_core::validation;
use picking_core::{
    CoreError, CoreResult, LineItem, ManifestInput, ManifestLine, PickingHistory, PickingRecord,
    PickingSession, SessionView, UnitsPerContainerRegistry, ATOMIC_UNIT, DEFAULT_MANIFEST_STATUS,
    HISTORY_LIMIT,
};

use crate::error::{SessionError, SessionResult, StoreResult};
use crate::events::{EventBus, ScanErrorKind, SessionEvent};
use crate::store::{self, CheckpointStore, KEY_HISTORY, KEY_PROGRESS, KEY_UNITS};

// =============================================================================
// Options
// =============================================================================

/// What manual adjustments may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentPolicy {
    /// Allow a line's scanned total to go below zero.
    #[serde(default)]
    pub allow_negative_total: bool,

    /// Allow lowering a complete line back under its expected quantity.
    #[serde(default = "default_true")]
    pub allow_reopen: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AdjustmentPolicy {
    fn default() -> Self {
        AdjustmentPolicy {
            allow_negative_total: false,
            allow_reopen: true,
        }
    }
}

impl AdjustmentPolicy {
    /// Checks `delta` against the policy and returns the new scanned total.
    ///
    /// ## Rules
    /// - Delta must not be zero
    /// - Total may go negative only with `allow_negative_total`
    /// - A complete line may drop below expected only with `allow_reopen`
    pub fn check(&self, item: &LineItem, delta: i64) -> CoreResult<i64> {
        let reject = |reason: &str| CoreError::InvalidAdjustment {
            code: item.code.clone(),
            delta,
            reason: reason.to_string(),
        };

        if delta == 0 {
            return Err(reject("delta must not be zero"));
        }

        let total = item
            .scanned_quantity
            .checked_add(delta)
            .ok_or_else(|| reject("quantity overflow"))?;

        if total < 0 && !self.allow_negative_total {
            return Err(reject("scanned total would drop below zero"));
        }

        if item.is_complete() && total < item.expected_quantity && !self.allow_reopen {
            return Err(reject("line is already complete"));
        }

        Ok(total)
    }
}

/// Runtime options for a [`PickingManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub matching: MatchOptions,
    pub adjustment: AdjustmentPolicy,
    /// Unit code that needs a units-per-container count.
    pub atomic_unit: String,
    pub history_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            matching: MatchOptions::default(),
            adjustment: AdjustmentPolicy::default(),
            atomic_unit: ATOMIC_UNIT.to_string(),
            history_limit: HISTORY_LIMIT,
        }
    }
}

// =============================================================================
// Phase & Outcome
// =============================================================================

/// Session-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No manifest loaded.
    Empty,
    /// Manifest loaded, nothing counted yet in this session.
    Loaded,
    /// At least one quantity mutation happened.
    InProgress,
    /// Last session finalized; nothing loaded since.
    Finalized,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Empty => write!(f, "empty"),
            SessionPhase::Loaded => write!(f, "loaded"),
            SessionPhase::InProgress => write!(f, "in_progress"),
            SessionPhase::Finalized => write!(f, "finalized"),
        }
    }
}

/// Result of one [`PickingManager::scan`] call.
///
/// Every variant except `Scanned` leaves quantities untouched.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Quantity incremented.
    Scanned {
        line: usize,
        item: LineItem,
        increment: i64,
        stage: MatchStage,
    },

    /// The line counts in atomic units and nobody said how many one
    /// container holds. Answer with `confirm_container_units`, then rescan.
    NeedsContainerConfirmation { line: usize, item: LineItem },

    /// Line already complete; the scan was blocked.
    QuantityExceeded { line: usize, item: LineItem },

    /// No cascade stage matched.
    NotFound { token: String },

    /// Token failed the shape check.
    MalformedCode { token: String, reason: String },

    /// Dropped because a container prompt is still open.
    AwaitingConfirmation { token: String, pending: LineItem },

    /// Nothing is loaded.
    NoActiveSession { token: String },
}

impl ScanOutcome {
    pub fn is_scanned(&self) -> bool {
        matches!(self, ScanOutcome::Scanned { .. })
    }

    /// Rejection kind, `None` for `Scanned` and the container prompt.
    pub fn error_kind(&self) -> Option<ScanErrorKind> {
        match self {
            ScanOutcome::Scanned { .. } | ScanOutcome::NeedsContainerConfirmation { .. } => None,
            ScanOutcome::QuantityExceeded { .. } => Some(ScanErrorKind::QuantityExceeded),
            ScanOutcome::NotFound { .. } => Some(ScanErrorKind::NotFound),
            ScanOutcome::MalformedCode { .. } => Some(ScanErrorKind::MalformedCode),
            ScanOutcome::AwaitingConfirmation { .. } => Some(ScanErrorKind::AwaitingConfirmation),
            ScanOutcome::NoActiveSession { .. } => Some(ScanErrorKind::NoActiveSession),
        }
    }

    /// Operator-facing message.
    pub fn message(&self) -> String {
        match self {
            ScanOutcome::Scanned {
                item, increment, ..
            } => format!(
                "{}: +{} ({}/{})",
                label(item),
                increment,
                item.scanned_quantity,
                item.expected_quantity
            ),
            ScanOutcome::NeedsContainerConfirmation { item, .. } => format!(
                "How many units does one container of {} ({}) hold?",
                label(item),
                item.barcode
            ),
            ScanOutcome::QuantityExceeded { item, .. } => format!(
                "{} is already complete ({}/{}); scan not counted",
                label(item),
                item.scanned_quantity,
                item.expected_quantity
            ),
            ScanOutcome::NotFound { token } => {
                format!("Code {} is not part of this manifest", token)
            }
            ScanOutcome::MalformedCode { token, reason } => {
                format!("Invalid code '{}': {}", token, reason)
            }
            ScanOutcome::AwaitingConfirmation { token, pending } => format!(
                "Scan {} ignored: enter the units per container for {} first",
                token,
                label(pending)
            ),
            ScanOutcome::NoActiveSession { .. } => {
                "No manifest loaded. Load a manifest before scanning".to_string()
            }
        }
    }
}

fn label(item: &LineItem) -> &str {
    if item.description.is_empty() {
        &item.code
    } else {
        &item.description
    }
}

// =============================================================================
// Picking Manager
// =============================================================================

/// Owner of the active picking session.
///
/// Construct with [`PickingManager::open`]; share across tasks through
/// [`SharedSession`](crate::SharedSession).
pub struct PickingManager {
    store: Arc<dyn CheckpointStore>,
    options: SessionOptions,
    session: Option<PickingSession>,
    registry: UnitsPerContainerRegistry,
    history: PickingHistory,
    /// Line with an open container prompt.
    pending: Option<usize>,
    /// A quantity changed since load.
    touched: bool,
    finalized: bool,
    storage_degraded: bool,
    events: EventBus,
}

impl std::fmt::Debug for PickingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickingManager")
            .field("backend", &self.store.backend_name())
            .field("phase", &self.phase())
            .field("pending", &self.pending)
            .field("history", &self.history.len())
            .field("storage_degraded", &self.storage_degraded)
            .finish_non_exhaustive()
    }
}

impl PickingManager {
    /// Restores registry, history and any active session from `store`.
    ///
    /// Missing or unreadable entries start empty. Registry counts are
    /// re-applied to restored atomic-unit lines.
    pub async fn open(store: Arc<dyn CheckpointStore>, options: SessionOptions) -> Self {
        let registry: UnitsPerContainerRegistry =
            store::load_or_default(store.as_ref(), KEY_UNITS).await;

        let mut history: PickingHistory = store::load_or_default(store.as_ref(), KEY_HISTORY).await;
        history.set_capacity(options.history_limit);

        let mut session: Option<PickingSession> =
            store::load_or_default(store.as_ref(), KEY_PROGRESS).await;

        if let Some(ref s) = session {
            if validation::validate_manifest_header(&s.header).is_err() {
                warn!("Discarding checkpoint without a manifest id");
                session = None;
            }
        }

        if let Some(ref mut s) = session {
            apply_registry(&registry, &mut s.items, &options.atomic_unit);
        }

        let touched = session.as_ref().is_some_and(PickingSession::has_progress);

        info!(
            backend = store.backend_name(),
            restored = ?session.as_ref().map(|s| s.header.manifest_id.as_str()),
            history = history.len(),
            units = registry.len(),
            "Picking manager opened"
        );

        PickingManager {
            store,
            options,
            session,
            registry,
            history,
            pending: None,
            touched,
            finalized: false,
            storage_degraded: false,
            events: EventBus::new(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Replaces any active session with a fresh one built from `input`.
    ///
    /// ## Errors
    /// - `InvalidManifest` when the header has no id or there are no lines
    pub async fn load_manifest(&mut self, input: ManifestInput) -> SessionResult<SessionView> {
        validation::validate_manifest_header(&input.header).map_err(|e| {
            CoreError::InvalidManifest {
                reason: e.to_string(),
            }
        })?;

        if input.lines.is_empty() {
            return Err(CoreError::InvalidManifest {
                reason: "manifest has no lines".to_string(),
            }
            .into());
        }

        let mut header = input.header;
        header.manifest_id = header.manifest_id.trim().to_string();
        if header.status.trim().is_empty() {
            header.status = DEFAULT_MANIFEST_STATUS.to_string();
        }

        let mut items: Vec<LineItem> = input.lines.iter().map(ManifestLine::to_line_item).collect();
        apply_registry(&self.registry, &mut items, &self.options.atomic_unit);

        if let Some(previous) = &self.session {
            if previous.has_progress() {
                warn!(
                    previous = %previous.header.manifest_id,
                    next = %header.manifest_id,
                    "Replacing a session that has progress"
                );
            }
        }

        info!(
            manifest_id = %header.manifest_id,
            lines = items.len(),
            "Manifest loaded"
        );

        self.session = Some(PickingSession::new(header, items, Utc::now()));
        self.pending = None;
        self.touched = false;
        self.finalized = false;

        self.checkpoint_session().await;
        let view = self.emit_view().ok_or(SessionError::NoActiveSession)?;
        Ok(view)
    }

    /// True when the restored session belongs to `manifest_id`, so the
    /// caller can continue it instead of loading a fresh copy.
    pub fn resume(&mut self, manifest_id: &str) -> bool {
        let matches = self
            .session
            .as_ref()
            .is_some_and(|s| s.header.manifest_id == manifest_id.trim());

        if matches {
            info!(manifest_id = %manifest_id.trim(), "Resuming picking session");
            self.emit_view();
        }

        matches
    }

    /// Discards the active session and its checkpoint without recording it.
    ///
    /// Returns false when nothing was loaded.
    pub async fn abandon(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        info!(
            manifest_id = %session.header.manifest_id,
            scanned = session.totals().scanned_quantity,
            "Picking session abandoned"
        );

        self.pending = None;
        self.touched = false;
        self.finalized = false;
        self.checkpoint_session().await;
        self.events.emit(SessionEvent::Abandoned {
            manifest_id: session.header.manifest_id,
        });
        true
    }

    /// Closes a complete session into a [`PickingRecord`].
    ///
    /// ## Errors
    /// - `NoActiveSession`
    /// - `PendingItems` listing every line short of its expected quantity
    pub async fn finalize(&mut self) -> SessionResult<PickingRecord> {
        let session = self.session.as_ref().ok_or(SessionError::NoActiveSession)?;

        if !session.is_completable() {
            let codes: Vec<String> = session
                .pending_items()
                .iter()
                .map(|item| item.code.clone())
                .collect();
            warn!(
                manifest_id = %session.header.manifest_id,
                pending = codes.len(),
                "Finalize refused"
            );
            return Err(CoreError::PendingItems { codes }.into());
        }

        let record = PickingRecord::from_session(session, Utc::now());
        self.history.push(record.clone());

        // History first: a crash before the checkpoint is removed restores
        // the session instead of losing the record.
        self.persist_history().await;

        self.session = None;
        self.pending = None;
        self.touched = false;
        self.finalized = true;
        self.checkpoint_session().await;

        info!(
            record_id = %record.id,
            manifest_id = %record.manifest_id,
            lines = record.totals.lines,
            scanned = record.totals.scanned_quantity,
            "Picking finalized"
        );

        self.events.emit(SessionEvent::Finalized {
            record: record.clone(),
        });
        Ok(record)
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Processes one raw scan token.
    ///
    /// Never fails: every rejection is a [`ScanOutcome`] variant with an
    /// operator message, and rejected scans are also sent as
    /// [`SessionEvent::ScanError`].
    pub async fn scan(&mut self, token: &str) -> ScanOutcome {
        let outcome = self.apply_scan(token);

        match &outcome {
            ScanOutcome::Scanned {
                item,
                increment,
                stage,
                ..
            } => {
                self.touched = true;
                self.checkpoint_session().await;
                self.events.emit(SessionEvent::ItemScanned {
                    item: item.clone(),
                    increment: *increment,
                    stage: *stage,
                });
                self.emit_view();
            }
            ScanOutcome::NeedsContainerConfirmation { item, .. } => {
                debug!(barcode = %item.barcode, "Container count required");
            }
            rejected => {
                if let Some(kind) = rejected.error_kind() {
                    debug!(kind = %kind, "Scan rejected");
                    self.events.emit(SessionEvent::ScanError {
                        kind,
                        detail: rejected.message(),
                    });
                }
            }
        }

        outcome
    }

    /// Match and mutate. No I/O.
    fn apply_scan(&mut self, token: &str) -> ScanOutcome {
        let raw = token.trim().to_string();
        let atomic = self.options.atomic_unit.as_str();

        let Some(session) = self.session.as_mut() else {
            return ScanOutcome::NoActiveSession { token: raw };
        };

        let token = match validation::validate_scan_token(&raw) {
            Ok(token) => token,
            Err(e) => {
                return ScanOutcome::MalformedCode {
                    token: raw,
                    reason: e.to_string(),
                }
            }
        };

        let found = barcode::resolve_with_stage(&token, &session.barcodes(), &self.options.matching);

        if let Some(line) = self.pending {
            if let Some(pending) = session.items.get(line) {
                return match found {
                    Some(hit) if hit.index == line => ScanOutcome::NeedsContainerConfirmation {
                        line,
                        item: pending.clone(),
                    },
                    _ => ScanOutcome::AwaitingConfirmation {
                        token,
                        pending: pending.clone(),
                    },
                };
            }
            self.pending = None;
        }

        let Some(hit) = found else {
            return ScanOutcome::NotFound { token };
        };
        let Some(item) = session.items.get_mut(hit.index) else {
            return ScanOutcome::NotFound { token };
        };

        if hit.stage.is_fuzzy() {
            info!(
                token = %token,
                barcode = %item.barcode,
                stage = %hit.stage,
                "Scan resolved by fuzzy stage"
            );
        }

        if item.needs_container_units(atomic) {
            match self.registry.get(&item.barcode) {
                Some(units) => {
                    debug!(barcode = %item.barcode, units, "Units per container from registry");
                    item.units_per_container = Some(units);
                }
                None => {
                    self.pending = Some(hit.index);
                    return ScanOutcome::NeedsContainerConfirmation {
                        line: hit.index,
                        item: item.clone(),
                    };
                }
            }
        }

        if item.is_complete() {
            return ScanOutcome::QuantityExceeded {
                line: hit.index,
                item: item.clone(),
            };
        }

        let increment = item.scan_increment(atomic);
        item.apply_increment(increment, Utc::now());

        debug!(
            code = %item.code,
            increment,
            scanned = item.scanned_quantity,
            expected = item.expected_quantity,
            "Item scanned"
        );

        ScanOutcome::Scanned {
            line: hit.index,
            item: item.clone(),
            increment,
            stage: hit.stage,
        }
    }

    // =========================================================================
    // Container Confirmation
    // =========================================================================

    /// Records how many atomic units one container of line `line` holds.
    ///
    /// Updates the line and the registry (keyed by barcode) but does not
    /// count anything: rescan the same code to increment.
    ///
    /// ## Errors
    /// - `InvalidUnits` when `count` is not a positive integer
    /// - `NoActiveSession`, `LineNotFound`
    pub async fn confirm_container_units(&mut self, line: usize, count: i64) -> SessionResult<u32> {
        let units = validation::validate_units_per_container(count).map_err(|e| {
            CoreError::InvalidUnits {
                input: count.to_string(),
                reason: e.to_string(),
            }
        })?;

        let session = self.session.as_mut().ok_or(SessionError::NoActiveSession)?;
        let item = session
            .items
            .get_mut(line)
            .ok_or_else(|| CoreError::LineNotFound(format!("line {}", line)))?;

        item.units_per_container = Some(units);
        let barcode = item.barcode.clone();

        // Lines sharing the barcode take the same count
        for other in session.items.iter_mut() {
            if other.barcode == barcode {
                other.units_per_container = Some(units);
            }
        }

        let previous = self.registry.set(&barcode, units);
        if self.pending == Some(line) {
            self.pending = None;
        }

        info!(barcode = %barcode, units, ?previous, "Units per container confirmed");

        self.persist_registry().await;
        self.checkpoint_session().await;
        self.emit_view();
        Ok(units)
    }

    /// Answers the open container prompt with raw operator input.
    ///
    /// Returns the line and the accepted count.
    pub async fn confirm_pending(&mut self, input: &str) -> SessionResult<(usize, u32)> {
        let line = self.pending.ok_or(SessionError::NoPendingConfirmation)?;

        let units = validation::parse_units_per_container(input).map_err(|e| {
            CoreError::InvalidUnits {
                input: input.trim().to_string(),
                reason: e.to_string(),
            }
        })?;

        let units = self.confirm_container_units(line, i64::from(units)).await?;
        Ok((line, units))
    }

    /// Closes an open container prompt without answering it.
    pub fn cancel_confirmation(&mut self) -> bool {
        let cancelled = self.pending.take().is_some();
        if cancelled {
            debug!("Container confirmation cancelled");
        }
        cancelled
    }

    /// Line with an open container prompt.
    pub fn pending_confirmation(&self) -> Option<(usize, &LineItem)> {
        let line = self.pending?;
        let item = self.session.as_ref()?.items.get(line)?;
        Some((line, item))
    }

    // =========================================================================
    // Manual Adjustment
    // =========================================================================

    /// Adds `delta` (may be negative) to line `line`, bypassing the matcher
    /// and the exceeded-quantity guard.
    ///
    /// ## Errors
    /// - `InvalidAdjustment` when the [`AdjustmentPolicy`] rejects it
    /// - `NoActiveSession`, `LineNotFound`
    pub async fn adjust_manually(&mut self, line: usize, delta: i64) -> SessionResult<LineItem> {
        let policy = self.options.adjustment;
        let session = self.session.as_mut().ok_or(SessionError::NoActiveSession)?;
        let item = session
            .items
            .get_mut(line)
            .ok_or_else(|| CoreError::LineNotFound(format!("line {}", line)))?;

        let total = policy.check(item, delta)?;
        item.scanned_quantity = total;
        if delta > 0 {
            item.last_scan_at = Some(Utc::now());
        }
        item.refresh();

        let updated = item.clone();
        info!(
            code = %updated.code,
            delta,
            scanned = updated.scanned_quantity,
            "Manual adjustment"
        );

        self.touched = true;
        self.checkpoint_session().await;
        self.events.emit(SessionEvent::ItemAdjusted {
            item: updated.clone(),
            delta,
        });
        self.emit_view();
        Ok(updated)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Owned snapshot of the active session.
    pub fn snapshot(&self) -> Option<SessionView> {
        self.session.as_ref().map(PickingSession::view)
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.session {
            Some(_) if self.touched => SessionPhase::InProgress,
            Some(_) => SessionPhase::Loaded,
            None if self.finalized => SessionPhase::Finalized,
            None => SessionPhase::Empty,
        }
    }

    /// Line index and item for a product code.
    pub fn find_by_code(&self, code: &str) -> Option<(usize, &LineItem)> {
        let session = self.session.as_ref()?;
        let line = session.position_by_code(code.trim())?;
        session.items.get(line).map(|item| (line, item))
    }

    pub fn history(&self) -> &PickingHistory {
        &self.history
    }

    /// Registered units per container for `barcode`.
    pub fn units_for(&self, barcode: &str) -> Option<u32> {
        self.registry.get(barcode.trim())
    }

    /// True after a checkpoint write failed and until one succeeds.
    pub fn storage_degraded(&self) -> bool {
        self.storage_degraded
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Registers an event subscriber.
    pub fn subscribe(&mut self) -> UnboundedReceiver<SessionEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes the active session, or removes the checkpoint when none.
    async fn checkpoint_session(&mut self) {
        let result = match &self.session {
            Some(session) => store::save_json(self.store.as_ref(), KEY_PROGRESS, session).await,
            None => self.store.remove(KEY_PROGRESS).await,
        };
        self.record_write(KEY_PROGRESS, result);
    }

    async fn persist_registry(&mut self) {
        let result = store::save_json(self.store.as_ref(), KEY_UNITS, &self.registry).await;
        self.record_write(KEY_UNITS, result);
    }

    async fn persist_history(&mut self) {
        let result = store::save_json(self.store.as_ref(), KEY_HISTORY, &self.history).await;
        self.record_write(KEY_HISTORY, result);
    }

    fn record_write(&mut self, key: &str, result: StoreResult<()>) {
        match result {
            Ok(()) => {
                if self.storage_degraded {
                    info!(key = %key, "Checkpoint storage recovered");
                    self.storage_degraded = false;
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Checkpoint write failed, continuing in memory");
                self.storage_degraded = true;
                self.events.emit(SessionEvent::PersistenceWarning {
                    key: key.to_string(),
                    detail: e.to_string(),
                });
            }
        }
    }

    fn emit_view(&mut self) -> Option<SessionView> {
        let view = self.snapshot()?;
        self.events.emit(SessionEvent::SessionUpdated { view: view.clone() });
        Some(view)
    }
}

/// Fills missing container counts on atomic-unit lines from the registry.
fn apply_registry(registry: &UnitsPerContainerRegistry, items: &mut [LineItem], atomic_unit: &str) {
    for item in items.iter_mut().filter(|i| i.needs_container_units(atomic_unit)) {
        if let Some(units) = registry.get(&item.barcode) {
            item.units_per_container = Some(units);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use picking_core::{ItemStatus, ManifestHeader};

    fn line(code: &str, barcode: &str, quantity: i64, unit: &str) -> ManifestLine {
        ManifestLine {
            code: code.to_string(),
            barcode: barcode.to_string(),
            description: format!("Product {}", code),
            quantity,
            unit: unit.to_string(),
            scanned_quantity: 0,
        }
    }

    fn manifest(lines: Vec<ManifestLine>) -> ManifestInput {
        ManifestInput {
            header: ManifestHeader {
                manifest_id: "CTRC-100".to_string(),
                operator_name: "Ana".to_string(),
                ..Default::default()
            },
            lines,
        }
    }

    async fn manager_with(options: SessionOptions) -> (PickingManager, MemoryStore) {
        let store = MemoryStore::new();
        let manager = PickingManager::open(Arc::new(store.clone()), options).await;
        (manager, store)
    }

    async fn manager() -> (PickingManager, MemoryStore) {
        manager_with(SessionOptions::default()).await
    }

    // -------------------------------------------------------------------------
    // Load
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_load_rejects_missing_id() {
        let (mut manager, _) = manager().await;
        let mut input = manifest(vec![line("P-1", "7891234567890", 1, "CX")]);
        input.header.manifest_id = "  ".into();

        let err = manager.load_manifest(input).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Core(CoreError::InvalidManifest { .. })
        ));
        assert_eq!(manager.phase(), SessionPhase::Empty);
    }

    #[tokio::test]
    async fn test_load_rejects_empty_lines() {
        let (mut manager, _) = manager().await;
        let err = manager.load_manifest(manifest(vec![])).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Core(CoreError::InvalidManifest { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_persists_and_keeps_prior_quantities() {
        let (mut manager, store) = manager().await;
        let mut partial = line("P-1", "7891234567890", 5, "CX");
        partial.scanned_quantity = 2;

        let view = manager.load_manifest(manifest(vec![partial])).await.unwrap();

        assert_eq!(view.items[0].scanned_quantity, 2);
        assert_eq!(view.items[0].status, ItemStatus::Partial);
        assert_eq!(view.header.status, DEFAULT_MANIFEST_STATUS);
        assert_eq!(manager.phase(), SessionPhase::Loaded);
        assert!(store.contains(KEY_PROGRESS));
    }

    #[tokio::test]
    async fn test_load_overwrites_previous_session() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 5, "CX")]))
            .await
            .unwrap();
        manager.scan("7891234567890").await;

        let mut next = manifest(vec![line("P-2", "7890000000001", 1, "CX")]);
        next.header.manifest_id = "CTRC-200".into();
        let view = manager.load_manifest(next).await.unwrap();

        assert_eq!(view.header.manifest_id, "CTRC-200");
        assert_eq!(view.items.len(), 1);
        assert_eq!(manager.phase(), SessionPhase::Loaded);
        assert!(manager.find_by_code("P-1").is_none());
    }

    // -------------------------------------------------------------------------
    // Scan
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_scan_without_session() {
        let (mut manager, _) = manager().await;
        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(outcome, ScanOutcome::NoActiveSession { .. }));
    }

    #[tokio::test]
    async fn test_scan_malformed_and_not_found() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 5, "CX")]))
            .await
            .unwrap();

        let outcome = manager.scan("12AB").await;
        assert!(matches!(outcome, ScanOutcome::MalformedCode { .. }));

        let outcome = manager.scan("11112222").await;
        assert_eq!(
            outcome,
            ScanOutcome::NotFound {
                token: "11112222".into()
            }
        );
        assert_eq!(manager.snapshot().unwrap().items[0].scanned_quantity, 0);
        assert_eq!(manager.phase(), SessionPhase::Loaded);
    }

    #[tokio::test]
    async fn test_scan_non_atomic_increments_by_one() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 2, "CX")]))
            .await
            .unwrap();

        let outcome = manager.scan(" 7891234567890\n").await;
        match outcome {
            ScanOutcome::Scanned {
                line,
                item,
                increment,
                stage,
            } => {
                assert_eq!(line, 0);
                assert_eq!(increment, 1);
                assert_eq!(stage, MatchStage::Exact);
                assert_eq!(item.status, ItemStatus::Partial);
                assert!(item.last_scan_at.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(manager.phase(), SessionPhase::InProgress);
    }

    #[tokio::test]
    async fn test_container_prompt_blocks_other_scans() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![
                line("P-1", "7891234567890", 24, "UN"),
                line("P-2", "7890000000001", 1, "CX"),
            ]))
            .await
            .unwrap();

        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(
            outcome,
            ScanOutcome::NeedsContainerConfirmation { line: 0, .. }
        ));

        // Other codes are dropped until the prompt is answered
        let outcome = manager.scan("7890000000001").await;
        assert!(matches!(outcome, ScanOutcome::AwaitingConfirmation { .. }));
        assert_eq!(manager.snapshot().unwrap().items[1].scanned_quantity, 0);

        // Same code re-prompts
        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(
            outcome,
            ScanOutcome::NeedsContainerConfirmation { line: 0, .. }
        ));

        let (line, units) = manager.confirm_pending("12 un").await.unwrap();
        assert_eq!((line, units), (0, 12));
        assert!(manager.pending_confirmation().is_none());

        // Confirmation alone counts nothing
        assert_eq!(manager.snapshot().unwrap().items[0].scanned_quantity, 0);

        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(outcome, ScanOutcome::Scanned { increment: 12, .. }));
    }

    #[tokio::test]
    async fn test_cancel_confirmation() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![
                line("P-1", "7891234567890", 24, "UN"),
                line("P-2", "7890000000001", 1, "CX"),
            ]))
            .await
            .unwrap();

        manager.scan("7891234567890").await;
        assert!(manager.cancel_confirmation());
        assert!(!manager.cancel_confirmation());

        let outcome = manager.scan("7890000000001").await;
        assert!(outcome.is_scanned());

        let err = manager.confirm_pending("12").await.unwrap_err();
        assert!(matches!(err, SessionError::NoPendingConfirmation));
    }

    #[tokio::test]
    async fn test_invalid_units_rejected() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 24, "UN")]))
            .await
            .unwrap();
        manager.scan("7891234567890").await;

        for bad in ["0", "-3", "abc"] {
            let err = manager.confirm_pending(bad).await.unwrap_err();
            assert!(
                matches!(err, SessionError::Core(CoreError::InvalidUnits { .. })),
                "input {:?}",
                bad
            );
        }
        // Prompt stays open
        assert!(manager.pending_confirmation().is_some());

        let err = manager.confirm_container_units(0, 0).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_large_container_count_accepted() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 40_000, "UN")]))
            .await
            .unwrap();
        manager.scan("7891234567890").await;

        let (line, units) = manager.confirm_pending("20000").await.unwrap();
        assert_eq!((line, units), (0, 20_000));

        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(
            outcome,
            ScanOutcome::Scanned { increment: 20_000, .. }
        ));
    }

    #[tokio::test]
    async fn test_registry_prefills_future_sessions() {
        let store = MemoryStore::new();
        {
            let mut manager =
                PickingManager::open(Arc::new(store.clone()), SessionOptions::default()).await;
            manager
                .load_manifest(manifest(vec![line("P-1", "7891234567890", 24, "UN")]))
                .await
                .unwrap();
            manager.confirm_container_units(0, 6).await.unwrap();
            manager.abandon().await;
        }

        let mut manager =
            PickingManager::open(Arc::new(store.clone()), SessionOptions::default()).await;
        assert_eq!(manager.units_for("7891234567890"), Some(6));

        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 24, "un")]))
            .await
            .unwrap();
        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(outcome, ScanOutcome::Scanned { increment: 6, .. }));
    }

    #[tokio::test]
    async fn test_quantity_exceeded_leaves_state() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 1, "CX")]))
            .await
            .unwrap();

        assert!(manager.scan("7891234567890").await.is_scanned());
        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(outcome, ScanOutcome::QuantityExceeded { .. }));
        assert_eq!(manager.snapshot().unwrap().items[0].scanned_quantity, 1);
    }

    #[tokio::test]
    async fn test_huge_manifest_quantities_do_not_overflow() {
        let (mut manager, _) = manager().await;
        let view = manager
            .load_manifest(manifest(vec![
                line("P-1", "7891234567890", i64::MAX, "CX"),
                line("P-2", "7890000000001", i64::MAX, "CX"),
            ]))
            .await
            .unwrap();
        assert_eq!(view.totals.expected_quantity, i64::MAX);

        let mut nearly_done = line("P-1", "7891234567890", i64::MAX, "UN");
        nearly_done.scanned_quantity = i64::MAX - 1;
        manager.load_manifest(manifest(vec![nearly_done])).await.unwrap();

        manager.scan("7891234567890").await;
        manager.confirm_pending("12").await.unwrap();

        match manager.scan("7891234567890").await {
            ScanOutcome::Scanned { item, .. } => {
                assert_eq!(item.scanned_quantity, i64::MAX);
                assert_eq!(item.status, ItemStatus::Complete);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fuzzy_stages_can_be_disabled() {
        let options = SessionOptions {
            matching: MatchOptions {
                fuzzy_enabled: false,
                ..MatchOptions::default()
            },
            ..SessionOptions::default()
        };
        let (mut manager, _) = manager_with(options).await;
        manager
            .load_manifest(manifest(vec![line("P-1", "00789123456789011", 1, "CX")]))
            .await
            .unwrap();

        let outcome = manager.scan("7891234567890").await;
        assert!(matches!(outcome, ScanOutcome::NotFound { .. }));
    }

    // -------------------------------------------------------------------------
    // Adjust
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_adjust_policy() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 3, "CX")]))
            .await
            .unwrap();

        let item = manager.adjust_manually(0, 3).await.unwrap();
        assert_eq!(item.status, ItemStatus::Complete);

        // Reopening allowed by default
        let item = manager.adjust_manually(0, -1).await.unwrap();
        assert_eq!(item.status, ItemStatus::Partial);

        let err = manager.adjust_manually(0, -5).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Core(CoreError::InvalidAdjustment { .. })
        ));

        let err = manager.adjust_manually(0, 0).await.unwrap_err();
        assert!(err.is_recoverable());

        let err = manager.adjust_manually(9, 1).await.unwrap_err();
        assert!(matches!(err, SessionError::Core(CoreError::LineNotFound(_))));
    }

    #[tokio::test]
    async fn test_adjust_notifies_subscribers() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 3, "CX")]))
            .await
            .unwrap();
        let mut rx = manager.subscribe();

        manager.adjust_manually(0, 2).await.unwrap();

        match rx.try_recv() {
            Ok(SessionEvent::ItemAdjusted { item, delta }) => {
                assert_eq!(delta, 2);
                assert_eq!(item.scanned_quantity, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(SessionEvent::SessionUpdated { .. })
        ));

        // Rejected adjustments are silent
        manager.adjust_manually(0, 0).await.unwrap_err();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_policy_without_reopen() {
        let policy = AdjustmentPolicy {
            allow_negative_total: true,
            allow_reopen: false,
        };
        let complete = LineItem::new("P-1", "7891234567890", "x", 3, 3, "CX");
        assert!(policy.check(&complete, -1).is_err());
        assert_eq!(policy.check(&complete, 2).unwrap(), 5);

        let partial = LineItem::new("P-1", "7891234567890", "x", 3, 1, "CX");
        assert_eq!(policy.check(&partial, -4).unwrap(), -3);
    }

    #[tokio::test]
    async fn test_adjust_bypasses_exceeded_guard() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 1, "CX")]))
            .await
            .unwrap();
        manager.scan("7891234567890").await;

        let item = manager.adjust_manually(0, 2).await.unwrap();
        assert_eq!(item.scanned_quantity, 3);
        assert_eq!(item.remaining_quantity, 0);
    }

    // -------------------------------------------------------------------------
    // Finalize / Abandon / Resume
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_finalize_lists_pending_codes() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![
                line("P-1", "7891234567890", 1, "CX"),
                line("P-2", "7890000000001", 2, "CX"),
            ]))
            .await
            .unwrap();
        manager.scan("7891234567890").await;

        match manager.finalize().await {
            Err(SessionError::Core(CoreError::PendingItems { codes })) => {
                assert_eq!(codes, vec!["P-2".to_string()])
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(manager.snapshot().is_some());
    }

    #[tokio::test]
    async fn test_finalize_records_and_clears() {
        let (mut manager, store) = manager().await;
        let mut rx = manager.subscribe();
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 1, "CX")]))
            .await
            .unwrap();
        manager.scan("7891234567890").await;

        let record = manager.finalize().await.unwrap();

        assert_eq!(record.manifest_id, "CTRC-100");
        assert_eq!(record.operator_name, "Ana");
        assert_eq!(manager.phase(), SessionPhase::Finalized);
        assert!(manager.snapshot().is_none());
        assert_eq!(manager.history().latest().map(|r| &r.id), Some(&record.id));
        assert!(!store.contains(KEY_PROGRESS));
        assert!(store.contains(KEY_HISTORY));

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec!["session_updated", "item_scanned", "session_updated", "finalized"]
        );

        let err = manager.finalize().await.unwrap_err();
        assert!(matches!(err, SessionError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_abandon() {
        let (mut manager, store) = manager().await;
        assert!(!manager.abandon().await);

        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 1, "CX")]))
            .await
            .unwrap();
        assert!(manager.abandon().await);

        assert_eq!(manager.phase(), SessionPhase::Empty);
        assert!(!store.contains(KEY_PROGRESS));
        assert!(manager.history().is_empty());
    }

    #[tokio::test]
    async fn test_restore_and_resume() {
        let store = MemoryStore::new();
        {
            let mut manager =
                PickingManager::open(Arc::new(store.clone()), SessionOptions::default()).await;
            manager
                .load_manifest(manifest(vec![line("P-1", "7891234567890", 3, "CX")]))
                .await
                .unwrap();
            manager.scan("7891234567890").await;
        }

        let mut manager =
            PickingManager::open(Arc::new(store.clone()), SessionOptions::default()).await;
        assert_eq!(manager.phase(), SessionPhase::InProgress);
        assert!(!manager.resume("CTRC-999"));
        assert!(manager.resume("CTRC-100"));
        assert_eq!(manager.snapshot().unwrap().items[0].scanned_quantity, 1);
    }

    #[tokio::test]
    async fn test_corrupted_checkpoint_starts_empty() {
        let store = MemoryStore::new();
        store.insert_raw(KEY_PROGRESS, "{broken");
        store.insert_raw(KEY_HISTORY, "42");

        let manager = PickingManager::open(Arc::new(store), SessionOptions::default()).await;
        assert_eq!(manager.phase(), SessionPhase::Empty);
        assert!(manager.history().is_empty());
    }

    // -------------------------------------------------------------------------
    // Persistence failures
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_storage_failure_does_not_block_scans() {
        let (mut manager, store) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 2, "CX")]))
            .await
            .unwrap();
        let mut rx = manager.subscribe();

        store.set_fail_writes(true);
        let outcome = manager.scan("7891234567890").await;
        assert!(outcome.is_scanned());
        assert!(manager.storage_degraded());
        assert_eq!(manager.snapshot().unwrap().items[0].scanned_quantity, 1);

        match rx.try_recv() {
            Ok(SessionEvent::PersistenceWarning { key, .. }) => assert_eq!(key, KEY_PROGRESS),
            other => panic!("unexpected event: {:?}", other),
        }

        store.set_fail_writes(false);
        manager.scan("7891234567890").await;
        assert!(!manager.storage_degraded());
    }

    #[tokio::test]
    async fn test_rejections_emit_scan_error() {
        let (mut manager, _) = manager().await;
        manager
            .load_manifest(manifest(vec![line("P-1", "7891234567890", 2, "CX")]))
            .await
            .unwrap();
        let mut rx = manager.subscribe();

        manager.scan("99999999").await;
        match rx.try_recv() {
            Ok(SessionEvent::ScanError { kind, detail }) => {
                assert_eq!(kind, ScanErrorKind::NotFound);
                assert!(detail.contains("99999999"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_outcome_messages() {
        let item = LineItem::new("P-1", "7891234567890", "Widget", 5, 5, "CX");
        let outcome = ScanOutcome::QuantityExceeded { line: 0, item };
        assert_eq!(
            outcome.message(),
            "Widget is already complete (5/5); scan not counted"
        );
        assert_eq!(outcome.error_kind(), Some(ScanErrorKind::QuantityExceeded));

        let outcome = ScanOutcome::NotFound {
            token: "12345678".into(),
        };
        assert_eq!(outcome.message(), "Code 12345678 is not part of this manifest");
    }
}
