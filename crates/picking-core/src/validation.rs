//! # Validation Module
//!
//! Input validation for the picking station.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Scanner / keyboard capture                                    │
//! │  └── Delivers discrete text tokens                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Token shape (digits, 8 to 20 long)                                 │
//! │  ├── Operator-entered container counts                                  │
//! │  └── Manifest header completeness                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Session business rules                                        │
//! │  └── Quantity exceeded, pending items, adjustment policy                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use picking_core::validation::{validate_scan_token, parse_units_per_container};
//!
//! let token = validate_scan_token(" 7891234567890 ").unwrap();
//! let units = parse_units_per_container("12").unwrap();
//! ```

use crate::barcode::{MAX_TOKEN_LEN, MIN_TOKEN_LEN};
use crate::error::ValidationError;
use crate::types::ManifestHeader;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Scan Tokens
// =============================================================================

/// Validates a scanned token and returns it trimmed.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Digits only
/// - Between 8 and 20 characters
///
/// ## Example
/// ```rust
/// use picking_core::validation::validate_scan_token;
///
/// assert_eq!(validate_scan_token(" 12345678\n").unwrap(), "12345678");
/// assert!(validate_scan_token("").is_err());
/// assert!(validate_scan_token("12AB5678").is_err());
/// ```
pub fn validate_scan_token(token: &str) -> ValidationResult<String> {
    let token = token.trim();

    if token.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if !token.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    let len = token.len();
    if !(MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&len) {
        return Err(ValidationError::OutOfRange {
            field: "barcode length".to_string(),
            min: MIN_TOKEN_LEN as i64,
            max: MAX_TOKEN_LEN as i64,
        });
    }

    Ok(token.to_string())
}

// =============================================================================
// Container Counts
// =============================================================================

/// Validates a units-per-container count.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must fit the registry's `u32` counts
pub fn validate_units_per_container(units: i64) -> ValidationResult<u32> {
    if units <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "units_per_container".to_string(),
        });
    }

    u32::try_from(units).map_err(|_| ValidationError::OutOfRange {
        field: "units_per_container".to_string(),
        min: 1,
        max: i64::from(u32::MAX),
    })
}

/// Parses operator input for a units-per-container prompt.
///
/// A leading integer is accepted (`"12 un"` reads as 12), matching how the
/// prompt has always behaved; input that does not start with a number is
/// rejected.
pub fn parse_units_per_container(input: &str) -> ValidationResult<u32> {
    let trimmed = input.trim();
    let digits_end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());

    let units: i64 = trimmed[..digits_end]
        .parse()
        .map_err(|_| ValidationError::InvalidFormat {
            field: "units_per_container".to_string(),
            reason: format!("'{}' is not a whole number", trimmed),
        })?;

    validate_units_per_container(units)
}

// =============================================================================
// Manifest
// =============================================================================

/// Validates a manifest header before load.
///
/// ## Rules
/// - Manifest id must not be empty
pub fn validate_manifest_header(header: &ManifestHeader) -> ValidationResult<()> {
    if header.manifest_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "manifest_id".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_scan_token() {
        assert_eq!(validate_scan_token("7891234567890").unwrap(), "7891234567890");
        assert_eq!(validate_scan_token("  12345678 ").unwrap(), "12345678");

        assert!(matches!(
            validate_scan_token("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_scan_token("7891-234567890"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_scan_token("1234567"),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_scan_token(&"1".repeat(21)).is_err());
    }

    #[test]
    fn test_validate_units_per_container() {
        assert_eq!(validate_units_per_container(1).unwrap(), 1);
        assert_eq!(validate_units_per_container(12).unwrap(), 12);
        assert_eq!(validate_units_per_container(20_000).unwrap(), 20_000);
        assert_eq!(
            validate_units_per_container(i64::from(u32::MAX)).unwrap(),
            u32::MAX
        );

        assert!(validate_units_per_container(0).is_err());
        assert!(validate_units_per_container(-5).is_err());
        assert!(matches!(
            validate_units_per_container(i64::from(u32::MAX) + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_parse_units_per_container() {
        assert_eq!(parse_units_per_container("12").unwrap(), 12);
        assert_eq!(parse_units_per_container(" 6 un").unwrap(), 6);

        assert!(matches!(
            parse_units_per_container("abc"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            parse_units_per_container(""),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            parse_units_per_container("0"),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            parse_units_per_container("-3"),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_validate_manifest_header() {
        let mut header = ManifestHeader::default();
        assert!(validate_manifest_header(&header).is_err());

        header.manifest_id = "CTRC-1".to_string();
        assert!(validate_manifest_header(&header).is_ok());
    }
}
