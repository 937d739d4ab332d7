//! # picking-session: Picking Session Manager
//!
//! Runs the scan → update → persist → notify cycle on top of
//! `picking-core`, with checkpoints in a pluggable store.
//!
//! ## Module Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       picking-session                                   │
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐    │
//! │  │   manager   │  │    store    │  │   events    │  │   config    │    │
//! │  │             │  │             │  │             │  │             │    │
//! │  │ PickingMgr  │─►│ Checkpoint  │  │ SessionEvent│  │ PickingCfg  │    │
//! │  │ ScanOutcome │  │  Store      │  │ EventBus    │  │ picking.toml│    │
//! │  │ Phase       │  │ Memory/Sqlite│ │             │  │ PICKING_*   │    │
//! │  └──────┬──────┘  └─────────────┘  └─────────────┘  └─────────────┘    │
//! │         │                                                               │
//! │  ┌──────┴──────┐  ┌─────────────┐  ┌─────────────┐                      │
//! │  │    state    │  │    error    │  │ settlement  │                      │
//! │  │ SharedSession│ │ SessionError│  │ Forwarder   │                      │
//! │  └─────────────┘  └─────────────┘  └─────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use picking_session::{MemoryStore, PickingConfig, PickingManager};
//!
//! # async fn run() {
//! let config = PickingConfig::default();
//! let mut manager =
//!     PickingManager::open(Arc::new(MemoryStore::new()), config.session_options()).await;
//!
//! let outcome = manager.scan("7891234567890").await;
//! println!("{}", outcome.message());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod settlement;
pub mod state;
pub mod store;

pub use config::{PickingConfig, SettlementSettings, StorageBackend};
pub use error::{
    ConfigError, SessionError, SessionResult, SettlementError, SettlementResult, StoreError,
    StoreResult,
};
pub use events::{EventBus, ScanErrorKind, SessionEvent};
pub use manager::{AdjustmentPolicy, PickingManager, ScanOutcome, SessionOptions, SessionPhase};
pub use settlement::{DrainReport, HttpSettlementSink, SettlementForwarder, SettlementSink};
pub use state::SharedSession;
pub use store::{CheckpointStore, MemoryStore, SqliteStore};
