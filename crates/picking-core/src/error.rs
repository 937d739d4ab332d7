//! # Error Types
//!
//! Domain-specific error types for picking-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  picking-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input shape failures                            │
//! │                                                                         │
//! │  picking-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  picking-session errors (separate crate)                                │
//! │  ├── SessionError     - What the operator driver sees                   │
//! │  └── ConfigError      - Configuration loading failures                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SessionError → operator message    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Scan rejections (not found, quantity exceeded, confirmation needed) are
//! NOT errors. They are outcomes returned by the session manager.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Scanned token failed the basic shape check.
    #[error("Malformed code '{token}': expected 8 to 20 digits")]
    MalformedCode { token: String },

    /// Manifest input is unusable.
    ///
    /// ## When This Occurs
    /// - Header has no manifest id
    /// - Source response is neither a wrapped manifest nor a bare item array
    #[error("Invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    /// Operator-supplied units-per-container count was rejected.
    #[error("Invalid units per container '{input}': {reason}")]
    InvalidUnits { input: String, reason: String },

    /// Finalize attempted while lines are still short.
    ///
    /// ## User Workflow
    /// ```text
    /// finalize()
    ///      │
    ///      ▼
    /// Line 7891234567890: scanned 3 of 5
    ///      │
    ///      ▼
    /// PendingItems { codes: ["P-001"] }
    ///      │
    ///      ▼
    /// Operator sees the short lines and keeps scanning
    /// ```
    #[error("{} item(s) still pending: {}", .codes.len(), .codes.join(", "))]
    PendingItems { codes: Vec<String> },

    /// No line at the given index or with the given code.
    #[error("Line item not found: {0}")]
    LineNotFound(String),

    /// Manual adjustment rejected by the adjustment policy.
    #[error("Adjustment of {delta} on {code} rejected: {reason}")]
    InvalidAdjustment {
        code: String,
        delta: i64,
        reason: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (non-digit token, unparsable number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
