//! # Session Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Session Errors                                       │
//! │                                                                         │
//! │  SessionError  - returned by PickingManager operations                  │
//! │  ├── Core      - business rule (pending items, bad units, manifest)     │
//! │  ├── NoActiveSession                                                    │
//! │  └── Config                                                             │
//! │                                                                         │
//! │  StoreError    - checkpoint store failures. Never returned by scan or   │
//! │                  finalize: they become PersistenceWarning events.       │
//! │                                                                         │
//! │  ConfigError   - picking.toml / environment problems                    │
//! │                                                                         │
//! │  SettlementError - outbox reads and settlement delivery                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use picking_core::CoreError;
use picking_db::DbError;
use thiserror::Error;

// =============================================================================
// Session Error
// =============================================================================

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Business rule violation from picking-core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Operation needs a loaded manifest.
    #[error("No active picking session")]
    NoActiveSession,

    /// A units-per-container answer arrived with no prompt open.
    #[error("No container confirmation is pending")]
    NoPendingConfirmation,

    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Returns true when the operator can fix the problem and retry
    /// (keep scanning, re-enter a count).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::NoPendingConfirmation
                | SessionError::Core(
                    CoreError::PendingItems { .. }
                        | CoreError::InvalidUnits { .. }
                        | CoreError::InvalidAdjustment { .. }
                        | CoreError::LineNotFound(_)
                        | CoreError::MalformedCode { .. }
                )
        )
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Store Error
// =============================================================================

/// Checkpoint store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite backend failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Value could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store is not accepting reads or writes.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Settlement Error
// =============================================================================

/// Settlement forwarding failures.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Outbox read or write failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] DbError),

    /// Transport failure (connect, timeout, TLS).
    #[error("Delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The source system answered with a non-success status.
    #[error("Source system rejected settlement: HTTP {status}")]
    Rejected { status: u16 },
}

/// Result type for settlement forwarding.
pub type SettlementResult<T> = Result<T, SettlementError>;

// =============================================================================
// Config Error
// =============================================================================

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    SaveFailed(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
