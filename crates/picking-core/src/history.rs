//! # Picking History
//!
//! Bounded, newest-first log of finalized pickings.
//!
//! ```text
//!   push(r4)        [r4, r3, r2, r1]      capacity 4
//!   push(r5)        [r5, r4, r3, r2]      r1 evicted (oldest first)
//! ```
//!
//! Eviction follows finalize order, never timestamps: two records finalized
//! in the same millisecond still leave in the order they arrived.

use serde::{Deserialize, Serialize};

use crate::types::PickingRecord;
use crate::HISTORY_LIMIT;

/// Newest-first list of [`PickingRecord`]s with a fixed capacity.
///
/// Serializes as a plain JSON array so a checkpoint is just the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickingHistory {
    records: Vec<PickingRecord>,
    #[serde(skip, default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    HISTORY_LIMIT
}

impl PickingHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_LIMIT)
    }

    /// A capacity of 0 is raised to 1.
    pub fn with_capacity(capacity: usize) -> Self {
        PickingHistory {
            records: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Re-bounds a history loaded from storage, evicting the oldest overflow.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.records.truncate(self.capacity);
    }

    /// Prepends a record and evicts from the tail beyond capacity.
    pub fn push(&mut self, record: PickingRecord) {
        self.records.insert(0, record);
        self.records.truncate(self.capacity);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<&PickingRecord> {
        self.records.first()
    }

    /// Records newest first.
    pub fn records(&self) -> &[PickingRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &PickingRecord> {
        self.records.iter()
    }
}

impl Default for PickingHistory {
    fn default() -> Self {
        Self::new()
    }
}
