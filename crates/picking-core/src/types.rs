//! # Domain Types
//!
//! Core domain types used throughout the picking station.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐       ┌──────────────────┐                        │
//! │  │  PickingSession  │ 1───* │     LineItem     │                        │
//! │  │  ──────────────  │       │  ──────────────  │                        │
//! │  │  header          │       │  code, barcode   │                        │
//! │  │  items           │       │  expected/scanned│                        │
//! │  │  started_at      │       │  unit, per box   │                        │
//! │  └────────┬─────────┘       │  status (derived)│                        │
//! │           │                 └──────────────────┘                        │
//! │           │ finalize                                                    │
//! │           ▼                                                             │
//! │  ┌──────────────────┐       ┌──────────────────┐                        │
//! │  │  PickingRecord   │ 1───* │    RecordLine    │   frozen snapshot      │
//! │  └──────────────────┘       └──────────────────┘                        │
//! │                                                                         │
//! │  SessionView = header + items + SessionTotals + SessionProgress         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Item State Machine
//! ```text
//!   Pending ──scan──► Partial ──scan──► Complete
//!      │                                   ▲
//!      └────────── one full container ─────┘
//! ```
//! Status is a pure function of the quantities. It is stored on the item for
//! presentation but always recomputed after a quantity change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

// =============================================================================
// Item Status
// =============================================================================

/// Fulfilment status of one line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Nothing scanned yet.
    Pending,
    /// Some but not all of the expected quantity scanned.
    Partial,
    /// Scanned quantity reached the expected quantity.
    Complete,
}

impl ItemStatus {
    /// Derives the status from scanned and expected quantities.
    ///
    /// ## Rules
    /// - `scanned >= expected` → Complete (an expected quantity of 0 is
    ///   complete from the start)
    /// - `scanned > 0` → Partial
    /// - otherwise Pending
    pub fn from_quantities(scanned: i64, expected: i64) -> Self {
        if scanned >= expected {
            ItemStatus::Complete
        } else if scanned > 0 {
            ItemStatus::Partial
        } else {
            ItemStatus::Pending
        }
    }
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Pending
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Partial => write!(f, "partial"),
            ItemStatus::Complete => write!(f, "complete"),
        }
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// One expected product line within a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    /// Source system product key.
    pub code: String,

    /// Barcode as published by the source system.
    pub barcode: String,

    /// Display text.
    pub description: String,

    /// Target count.
    pub expected_quantity: i64,

    /// Running total of scanned units.
    pub scanned_quantity: i64,

    /// `max(0, expected - scanned)`, kept in sync by [`LineItem::refresh`].
    pub remaining_quantity: i64,

    /// Unit-of-measure code ("UN", "CX", ...).
    pub unit: String,

    /// How many atomic units one scan represents.
    pub units_per_container: Option<u32>,

    /// Derived from the quantities, kept in sync by [`LineItem::refresh`].
    pub status: ItemStatus,

    /// Set on every successful increment.
    #[ts(as = "Option<String>")]
    pub last_scan_at: Option<DateTime<Utc>>,
}

impl LineItem {
    /// Creates a line with derived fields already computed.
    pub fn new(
        code: impl Into<String>,
        barcode: impl Into<String>,
        description: impl Into<String>,
        expected_quantity: i64,
        scanned_quantity: i64,
        unit: impl Into<String>,
    ) -> Self {
        let mut item = LineItem {
            code: code.into(),
            barcode: barcode.into().trim().to_string(),
            description: description.into(),
            expected_quantity,
            scanned_quantity,
            remaining_quantity: 0,
            unit: unit.into(),
            units_per_container: None,
            status: ItemStatus::Pending,
            last_scan_at: None,
        };
        item.refresh();
        item
    }

    /// Recomputes `remaining_quantity` and `status` from the quantities.
    pub fn refresh(&mut self) {
        self.remaining_quantity = self
            .expected_quantity
            .saturating_sub(self.scanned_quantity)
            .max(0);
        self.status = ItemStatus::from_quantities(self.scanned_quantity, self.expected_quantity);
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.scanned_quantity >= self.expected_quantity
    }

    /// Case-insensitive comparison against the atomic unit code.
    pub fn is_atomic_unit(&self, atomic_code: &str) -> bool {
        self.unit.trim().eq_ignore_ascii_case(atomic_code.trim())
    }

    /// True when a scan cannot count this item until the operator says how
    /// many atomic units one container holds.
    pub fn needs_container_units(&self, atomic_code: &str) -> bool {
        self.is_atomic_unit(atomic_code) && self.units_per_container.is_none()
    }

    /// Quantity one scan adds: the container multiplier for atomic units,
    /// otherwise 1.
    pub fn scan_increment(&self, atomic_code: &str) -> i64 {
        match self.units_per_container {
            Some(units) if self.is_atomic_unit(atomic_code) => i64::from(units),
            _ => 1,
        }
    }

    /// Adds `delta` to the scanned quantity and stamps the scan time.
    ///
    /// Saturates at `i64::MAX`; manifest quantities are not bounded.
    pub fn apply_increment(&mut self, delta: i64, now: DateTime<Utc>) {
        self.scanned_quantity = self.scanned_quantity.saturating_add(delta);
        self.last_scan_at = Some(now);
        self.refresh();
    }
}

// =============================================================================
// Manifest Header
// =============================================================================

/// Shipment header metadata, fixed at load time except `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManifestHeader {
    /// Manifest (CTRC) identifier. Required.
    pub manifest_id: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub expected_delivery_date: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub operator_name: String,
}

// =============================================================================
// Picking Session
// =============================================================================

/// The aggregate root: one active manifest and its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PickingSession {
    pub header: ManifestHeader,

    /// Lines in load order. Order is stable and is the matcher tie-break.
    pub items: Vec<LineItem>,

    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
}

impl PickingSession {
    pub fn new(header: ManifestHeader, items: Vec<LineItem>, started_at: DateTime<Utc>) -> Self {
        PickingSession {
            header,
            items,
            started_at,
        }
    }

    /// Barcodes in line order, as fed to the matcher.
    pub fn barcodes(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.barcode.as_str()).collect()
    }

    pub fn position_by_code(&self, code: &str) -> Option<usize> {
        self.items.iter().position(|i| i.code == code)
    }

    /// A session is completable iff every line reached its expected quantity.
    pub fn is_completable(&self) -> bool {
        self.items.iter().all(LineItem::is_complete)
    }

    /// Lines still short of their expected quantity.
    pub fn pending_items(&self) -> Vec<&LineItem> {
        self.items.iter().filter(|i| !i.is_complete()).collect()
    }

    /// True once any line has a scanned quantity.
    pub fn has_progress(&self) -> bool {
        self.items.iter().any(|i| i.scanned_quantity > 0)
    }

    pub fn totals(&self) -> SessionTotals {
        SessionTotals::from_items(&self.items)
    }

    /// Owned read-only projection for presentation.
    pub fn view(&self) -> SessionView {
        let totals = self.totals();
        SessionView {
            header: self.header.clone(),
            items: self.items.clone(),
            progress: SessionProgress::from_totals(&totals),
            totals,
            started_at: self.started_at,
        }
    }
}

// =============================================================================
// Totals & Progress
// =============================================================================

/// Aggregates recomputed on demand from the lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionTotals {
    pub lines: usize,
    pub completed_lines: usize,
    pub expected_quantity: i64,
    pub scanned_quantity: i64,
    pub remaining_quantity: i64,
}

impl SessionTotals {
    pub fn from_items(items: &[LineItem]) -> Self {
        items.iter().fold(SessionTotals::default(), |mut acc, item| {
            acc.lines += 1;
            if item.is_complete() {
                acc.completed_lines += 1;
            }
            acc.expected_quantity = acc.expected_quantity.saturating_add(item.expected_quantity);
            acc.scanned_quantity = acc.scanned_quantity.saturating_add(item.scanned_quantity);
            acc.remaining_quantity = acc.remaining_quantity.saturating_add(
                item.expected_quantity
                    .saturating_sub(item.scanned_quantity)
                    .max(0),
            );
            acc
        })
    }
}

/// Completion ratios in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionProgress {
    /// Completed lines over total lines.
    pub line_ratio: f64,
    /// Scanned quantity over expected quantity, capped at 1.0.
    pub quantity_ratio: f64,
}

impl SessionProgress {
    pub fn from_totals(totals: &SessionTotals) -> Self {
        SessionProgress {
            line_ratio: ratio(totals.completed_lines as f64, totals.lines as f64),
            quantity_ratio: ratio(
                totals.scanned_quantity as f64,
                totals.expected_quantity as f64,
            ),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        return 0.0;
    }
    (numerator / denominator).clamp(0.0, 1.0)
}

/// Read-only snapshot handed to the presentation layer.
///
/// Owned clone of the session state: mutating it never reaches the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionView {
    pub header: ManifestHeader,
    pub items: Vec<LineItem>,
    pub totals: SessionTotals,
    pub progress: SessionProgress,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
}

// =============================================================================
// Picking Record (history entry)
// =============================================================================

/// A frozen line inside a [`PickingRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecordLine {
    pub code: String,
    pub barcode: String,
    pub description: String,
    pub expected_quantity: i64,
    pub scanned_quantity: i64,
    pub status: ItemStatus,
}

impl From<&LineItem> for RecordLine {
    fn from(item: &LineItem) -> Self {
        RecordLine {
            code: item.code.clone(),
            barcode: item.barcode.clone(),
            description: item.description.clone(),
            expected_quantity: item.expected_quantity,
            scanned_quantity: item.scanned_quantity,
            status: ItemStatus::from_quantities(item.scanned_quantity, item.expected_quantity),
        }
    }
}

/// Immutable snapshot produced by a successful finalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PickingRecord {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub manifest_id: String,
    pub operator_name: String,
    #[ts(as = "String")]
    pub started_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub finished_at: DateTime<Utc>,
    pub items: Vec<RecordLine>,
    pub totals: SessionTotals,
}

impl PickingRecord {
    /// Freezes the session into a history entry.
    pub fn from_session(session: &PickingSession, finished_at: DateTime<Utc>) -> Self {
        PickingRecord {
            id: Uuid::new_v4().to_string(),
            manifest_id: session.header.manifest_id.clone(),
            operator_name: session.header.operator_name.clone(),
            started_at: session.started_at,
            finished_at,
            items: session.items.iter().map(RecordLine::from).collect(),
            totals: session.totals(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(expected: i64, scanned: i64, unit: &str) -> LineItem {
        LineItem::new("P-001", "7891234567890", "Widget", expected, scanned, unit)
    }

    #[test]
    fn test_status_from_quantities() {
        assert_eq!(ItemStatus::from_quantities(0, 5), ItemStatus::Pending);
        assert_eq!(ItemStatus::from_quantities(3, 5), ItemStatus::Partial);
        assert_eq!(ItemStatus::from_quantities(5, 5), ItemStatus::Complete);
        assert_eq!(ItemStatus::from_quantities(7, 5), ItemStatus::Complete);
        assert_eq!(ItemStatus::from_quantities(0, 0), ItemStatus::Complete);
    }

    #[test]
    fn test_new_item_derives_fields() {
        let line = item(5, 2, "CX");
        assert_eq!(line.remaining_quantity, 3);
        assert_eq!(line.status, ItemStatus::Partial);
        assert!(line.last_scan_at.is_none());
    }

    #[test]
    fn test_apply_increment() {
        let mut line = item(5, 0, "CX");
        let now = Utc::now();

        line.apply_increment(5, now);

        assert_eq!(line.scanned_quantity, 5);
        assert_eq!(line.remaining_quantity, 0);
        assert_eq!(line.status, ItemStatus::Complete);
        assert_eq!(line.last_scan_at, Some(now));
    }

    #[test]
    fn test_increment_saturates_on_huge_quantities() {
        let mut line = item(i64::MAX, i64::MAX - 1, "UN");
        line.units_per_container = Some(12);

        line.apply_increment(line.scan_increment("UN"), Utc::now());

        assert_eq!(line.scanned_quantity, i64::MAX);
        assert_eq!(line.remaining_quantity, 0);
        assert_eq!(line.status, ItemStatus::Complete);
    }

    #[test]
    fn test_totals_saturate_on_huge_quantities() {
        let items = vec![item(i64::MAX, 0, "CX"), item(i64::MAX, 1, "CX")];

        let totals = SessionTotals::from_items(&items);

        assert_eq!(totals.lines, 2);
        assert_eq!(totals.expected_quantity, i64::MAX);
        assert_eq!(totals.scanned_quantity, 1);
        assert_eq!(totals.remaining_quantity, i64::MAX);
    }

    #[test]
    fn test_remaining_never_negative() {
        let mut line = item(5, 0, "CX");
        line.apply_increment(8, Utc::now());
        assert_eq!(line.remaining_quantity, 0);
    }

    #[test]
    fn test_atomic_unit_handling() {
        let mut line = item(24, 0, "un");
        assert!(line.is_atomic_unit("UN"));
        assert!(line.needs_container_units("UN"));
        assert_eq!(line.scan_increment("UN"), 1);

        line.units_per_container = Some(12);
        assert!(!line.needs_container_units("UN"));
        assert_eq!(line.scan_increment("UN"), 12);

        let boxed = item(3, 0, "CX");
        assert!(!boxed.needs_container_units("UN"));
        assert_eq!(boxed.scan_increment("UN"), 1);
    }

    #[test]
    fn test_totals_and_progress() {
        let session = PickingSession::new(
            ManifestHeader {
                manifest_id: "CTRC-1".to_string(),
                ..Default::default()
            },
            vec![item(5, 5, "CX"), item(4, 1, "CX"), item(2, 0, "CX")],
            Utc::now(),
        );

        let totals = session.totals();
        assert_eq!(totals.lines, 3);
        assert_eq!(totals.completed_lines, 1);
        assert_eq!(totals.expected_quantity, 11);
        assert_eq!(totals.scanned_quantity, 6);
        assert_eq!(totals.remaining_quantity, 5);

        let progress = SessionProgress::from_totals(&totals);
        assert!((progress.line_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert!((progress.quantity_ratio - 6.0 / 11.0).abs() < 1e-9);

        assert!(!session.is_completable());
        assert_eq!(session.pending_items().len(), 2);
    }

    #[test]
    fn test_progress_empty_session_is_zero() {
        let progress = SessionProgress::from_totals(&SessionTotals::default());
        assert_eq!(progress.line_ratio, 0.0);
        assert_eq!(progress.quantity_ratio, 0.0);
    }

    #[test]
    fn test_view_is_detached_copy() {
        let session = PickingSession::new(ManifestHeader::default(), vec![item(5, 0, "CX")], Utc::now());
        let mut view = session.view();
        view.items[0].scanned_quantity = 99;
        assert_eq!(session.items[0].scanned_quantity, 0);
    }

    #[test]
    fn test_record_from_session() {
        let header = ManifestHeader {
            manifest_id: "CTRC-9".to_string(),
            operator_name: "Ana".to_string(),
            ..Default::default()
        };
        let session = PickingSession::new(header, vec![item(5, 5, "CX")], Utc::now());
        let record = PickingRecord::from_session(&session, Utc::now());

        assert_eq!(record.manifest_id, "CTRC-9");
        assert_eq!(record.operator_name, "Ana");
        assert_eq!(record.items[0].scanned_quantity, 5);
        assert_eq!(record.items[0].status, ItemStatus::Complete);
        assert_eq!(record.totals.completed_lines, 1);
        assert!(Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn test_item_status_serializes_snake_case() {
        let json = serde_json::to_string(&ItemStatus::Complete).unwrap();
        assert_eq!(json, "\"complete\"");
    }
}
