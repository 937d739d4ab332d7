//! # Checkpoint Store
//!
//! Key-value persistence behind the session manager.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Checkpoint Keys                                      │
//! │                                                                         │
//! │  picking_progress              active session (removed on finalize)    │
//! │  picking_history               newest-first finalized records          │
//! │  picking_units_per_container   barcode → units registry                │
//! │                                                                         │
//! │  Each key is written in one call. A crash between two keys leaves      │
//! │  each of them either old or new, never half written.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers go through [`load_or_default`]: a missing key, a corrupted value
//! or a failing backend all yield the default.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use picking_db::Database;

use crate::error::{StoreError, StoreResult};

/// Active session checkpoint.
pub const KEY_PROGRESS: &str = "picking_progress";

/// Finalized picking history.
pub const KEY_HISTORY: &str = "picking_history";

/// Units-per-container registry.
pub const KEY_UNITS: &str = "picking_units_per_container";

// =============================================================================
// Store Trait
// =============================================================================

/// Persistent key-value store for JSON checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replaces the value under `key`.
    async fn save(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Value under `key`, `None` when absent.
    async fn load(&self, key: &str) -> StoreResult<Option<String>>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Serializes `value` and saves it under `key`.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn CheckpointStore,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let json = serde_json::to_string(value)?;
    store.save(key, &json).await
}

/// Loads and decodes `key`, falling back to `T::default()`.
///
/// ## Returns
/// - `Ok(Some(value))` when present and readable
/// - `Ok(None)` when the key is absent
/// - `Err(..)` when the backend failed or the value is corrupted
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn CheckpointStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.load(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Loads `key`, returning the default on a missing or unreadable entry.
pub async fn load_or_default<T: DeserializeOwned + Default>(
    store: &dyn CheckpointStore,
    key: &str,
) -> T {
    match load_json(store, key).await {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!(key = %key, "No checkpoint stored, using default");
            T::default()
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Unreadable checkpoint, using default");
            T::default()
        }
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process store.
///
/// Clones share the same map, so a test can keep a handle after moving the
/// store into a manager. Writes can be made to fail with
/// [`MemoryStore::set_fail_writes`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save`/`remove` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stores a raw value, bypassing serialization.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    /// Raw value under `key`.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store rejecting writes".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn save(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.get_raw(key))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.lock().remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// SQLite Store
// =============================================================================

/// Store backed by the `checkpoints` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn save(&self, key: &str, value: &str) -> StoreResult<()> {
        self.db.checkpoints().put(key, value).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.db.checkpoints().get(key).await?)
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.db.checkpoints().delete(key).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picking_core::UnitsPerContainerRegistry;
    use picking_db::DbConfig;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();

        let mut registry = UnitsPerContainerRegistry::new();
        registry.set("7891234567890", 12);
        save_json(&store, KEY_UNITS, &registry).await.unwrap();

        let loaded: UnitsPerContainerRegistry = load_or_default(&store, KEY_UNITS).await;
        assert_eq!(loaded.get("7891234567890"), Some(12));

        store.remove(KEY_UNITS).await.unwrap();
        assert!(!store.contains(KEY_UNITS));
    }

    #[tokio::test]
    async fn test_corrupted_entry_yields_default() {
        let store = MemoryStore::new();
        store.insert_raw(KEY_UNITS, "{not json");

        let loaded: UnitsPerContainerRegistry = load_or_default(&store, KEY_UNITS).await;
        assert!(loaded.is_empty());

        let err = load_json::<UnitsPerContainerRegistry>(&store, KEY_UNITS)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.save(KEY_HISTORY, "[]").await.unwrap();

        store.set_fail_writes(true);
        assert!(store.save(KEY_HISTORY, "[1]").await.is_err());
        assert!(store.remove(KEY_HISTORY).await.is_err());
        // Reads still work
        assert_eq!(store.load(KEY_HISTORY).await.unwrap().as_deref(), Some("[]"));

        store.set_fail_writes(false);
        store.save(KEY_HISTORY, "[1]").await.unwrap();
        assert_eq!(store.get_raw(KEY_HISTORY).as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let store = MemoryStore::new();
        let handle = store.clone();

        store.save(KEY_PROGRESS, "{}").await.unwrap();
        assert!(handle.contains(KEY_PROGRESS));
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = SqliteStore::new(db);

        assert_eq!(store.load(KEY_PROGRESS).await.unwrap(), None);

        store.save(KEY_PROGRESS, r#"{"x":1}"#).await.unwrap();
        assert_eq!(
            store.load(KEY_PROGRESS).await.unwrap().as_deref(),
            Some(r#"{"x":1}"#)
        );

        store.remove(KEY_PROGRESS).await.unwrap();
        store.remove(KEY_PROGRESS).await.unwrap();
        assert_eq!(store.load(KEY_PROGRESS).await.unwrap(), None);
        assert_eq!(store.backend_name(), "sqlite");
    }
}
