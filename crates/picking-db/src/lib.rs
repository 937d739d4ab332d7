//! # picking-db: Database Layer for the Picking Station
//!
//! This crate provides database access for the picking station.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Picking Station Data Flow                          │
//! │                                                                         │
//! │  PickingManager (checkpoint after every mutation)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    picking-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ Checkpoint     │   │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ SettlementOut- │   │ _schema.sql  │  │   │
//! │  │   │               │    │ box            │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <platform data dir>/picking.db                                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Checkpoint and settlement outbox repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use picking_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("picking.db")).await?;
//!
//! db.checkpoints().put("picking_progress", "{...}").await?;
//! let pending = db.settlements().get_pending(10).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::checkpoint::CheckpointRepository;
pub use repository::settlement::{SettlementOutboxEntry, SettlementOutboxRepository};
