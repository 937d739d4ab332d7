//! Units-per-container registry.
//!
//! Remembers, per barcode, how many atomic units one scanned container
//! holds. Lives independently of any session so later manifests with the
//! same barcode skip the confirmation prompt. Entries only come from an
//! explicit operator confirmation, never from inference.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Barcode → units per container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitsPerContainerRegistry {
    entries: BTreeMap<String, u32>,
}

impl UnitsPerContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, barcode: &str) -> Option<u32> {
        self.entries.get(barcode.trim()).copied()
    }

    /// Stores or overwrites an entry. Returns the previous value.
    pub fn set(&mut self, barcode: &str, units: u32) -> Option<u32> {
        self.entries.insert(barcode.trim().to_string(), units)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
