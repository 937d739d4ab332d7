//! # Repository Module
//!
//! Database repository implementations for the picking station.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  SqliteStore (picking-session)                                          │
//! │       │                                                                 │
//! │       │  db.checkpoints().put("picking_progress", json)                 │
//! │       ▼                                                                 │
//! │  CheckpointRepository                                                   │
//! │  ├── get(&self, key)                                                    │
//! │  ├── put(&self, key, value)      single-statement upsert                │
//! │  ├── delete(&self, key)                                                 │
//! │  └── keys(&self)                                                        │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CheckpointRepository`](checkpoint::CheckpointRepository) - Key-value checkpoint rows
//! - [`SettlementOutboxRepository`](settlement::SettlementOutboxRepository) - Finalized pickings waiting to be forwarded

pub mod checkpoint;
pub mod settlement;
