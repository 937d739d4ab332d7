//! # picking-core: Pure Business Logic for the Picking Station
//!
//! This crate is the **heart** of the picking station. It contains the
//! barcode matching cascade and the line-item state machine as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Picking Station Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Scanner input / presentation layer                 │   │
//! │  │        raw token ──► scan()        snapshot ◄── events          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            picking-session (PickingManager)                     │   │
//! │  │    validate → resolve → update → persist → notify               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ picking-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  barcode  │  │   types   │  │ manifest  │  │  history  │  │   │
//! │  │   │  resolve  │  │ LineItem  │  │ payloads  │  │ registry  │  │   │
//! │  │   │  cascade  │  │ Session   │  │ Settlement│  │ (bounded) │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`barcode`] - Token validation and the multi-stage matching cascade
//! - [`types`] - Domain types (LineItem, PickingSession, PickingRecord, ...)
//! - [`manifest`] - Manifest input normalisation and settlement payloads
//! - [`history`] - Bounded, newest-first log of finalized pickings
//! - [`registry`] - Units-per-container registry keyed by barcode
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use picking_core::barcode::{resolve, strip_edge_digits};
//!
//! let barcodes = vec!["7891234567890".to_string()];
//!
//! // Scanner firmware wrapped the EAN with one digit on each side
//! assert_eq!(strip_edge_digits("878912345678908"), "7891234567890");
//! assert_eq!(resolve("878912345678908", &barcodes), Some(0));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod barcode;
pub mod error;
pub mod history;
pub mod manifest;
pub mod registry;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use history::PickingHistory;
pub use manifest::{ManifestInput, ManifestLine, Settlement, SettlementLine};
pub use registry::UnitsPerContainerRegistry;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Unit-of-measure code for atomic units.
///
/// Items in this unit must have a units-per-container multiplier before a
/// scan can count them.
pub const ATOMIC_UNIT: &str = "UN";

/// Maximum finalized pickings kept in history (oldest evicted first).
pub const HISTORY_LIMIT: usize = 50;

/// Minimum shared digit run accepted by the longest-common-substring stage.
pub const MIN_COMMON_RUN: usize = 12;

/// Status assigned to a manifest when the source system omits one.
pub const DEFAULT_MANIFEST_STATUS: &str = "Em Separação";
