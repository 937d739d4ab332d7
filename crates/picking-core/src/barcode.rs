//! # Barcode Normalizer / Matcher
//!
//! Validates scanned tokens and resolves them against the barcodes of the
//! expected line items.
//!
//! ## Why a Cascade?
//! Physical scanners and printed labels disagree on how many non-EAN digits
//! wrap the real code. Some collector firmwares emit one extra digit on each
//! side of a 13-digit EAN, some source records carry extra digits of their
//! own. Each stage trades specificity for recall, and stage order is the
//! tie-break: an exact match is never shadowed by a fuzzy one.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Resolution Cascade                                 │
//! │                                                                         │
//! │  token ──► 1. Exact             token == barcode                        │
//! │       │                                                                 │
//! │       ├──► 2. StrippedToken     strip(token) == barcode  (token > 13)   │
//! │       │                                                                 │
//! │       ├──► 3. StrippedBarcode   token == strip(barcode)  (barcode > 13) │
//! │       │                                                                 │
//! │       │    ── fuzzy stages (can be disabled) ──                         │
//! │       │                                                                 │
//! │       ├──► 4. Containment       one contains the other (both >= 13)     │
//! │       │                                                                 │
//! │       ├──► 5. Core13            core13(token) vs core13(barcode)        │
//! │       │                                                                 │
//! │       ├──► 6. CommonRun         longest shared run >= 12 digits         │
//! │       │                                                                 │
//! │       └──► None                                                         │
//! │                                                                         │
//! │  Within a stage the first barcode in list order wins.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Checksums
//! [`has_valid_ean13_checksum`] is available as an auxiliary validator but
//! is deliberately NOT part of the cascade: codes that lost their check digit
//! to scanner corruption must still resolve.

use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use crate::MIN_COMMON_RUN;

/// Minimum accepted token length (EAN-8).
pub const MIN_TOKEN_LEN: usize = 8;

/// Maximum accepted token length (EAN-13 plus wrapping digits).
pub const MAX_TOKEN_LEN: usize = 20;

/// Length of a standard EAN-13 code.
pub const EAN13_LEN: usize = 13;

// =============================================================================
// Match Types
// =============================================================================

/// The cascade stage that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    /// Token equals the stored barcode.
    Exact,
    /// Token with its edge digits stripped equals the stored barcode.
    StrippedToken,
    /// Token equals the stored barcode with its edge digits stripped.
    StrippedBarcode,
    /// One code contains the other.
    Containment,
    /// The centered 13-digit cores are equal (or contain each other).
    Core13,
    /// Longest common digit run of at least `min_common_run` digits.
    CommonRun,
}

impl MatchStage {
    /// Returns true for stages 4-6, which can produce false positives
    /// between different products sharing a long digit run.
    pub fn is_fuzzy(&self) -> bool {
        matches!(
            self,
            MatchStage::Containment | MatchStage::Core13 | MatchStage::CommonRun
        )
    }
}

impl std::fmt::Display for MatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStage::Exact => write!(f, "exact"),
            MatchStage::StrippedToken => write!(f, "stripped_token"),
            MatchStage::StrippedBarcode => write!(f, "stripped_barcode"),
            MatchStage::Containment => write!(f, "containment"),
            MatchStage::Core13 => write!(f, "core13"),
            MatchStage::CommonRun => write!(f, "common_run"),
        }
    }
}

/// A resolved match: position in the barcode list and the stage that hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    pub stage: MatchStage,
}

/// Tuning knobs for the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Run stages 4-6. When false, only exact and edge-stripped matches count.
    pub fuzzy_enabled: bool,

    /// Minimum shared run length for the common-run stage.
    pub min_common_run: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions {
            fuzzy_enabled: true,
            min_common_run: MIN_COMMON_RUN,
        }
    }
}

// =============================================================================
// Token Shape
// =============================================================================

/// Checks that a token is non-empty, all digits after trimming, and
/// between 8 and 20 characters long.
///
/// ## Example
/// ```rust
/// use picking_core::barcode::is_well_formed;
///
/// assert!(is_well_formed("7891234567890"));
/// assert!(is_well_formed(" 12345678 "));
/// assert!(!is_well_formed("1234567"));
/// assert!(!is_well_formed("78912345A7890"));
/// ```
pub fn is_well_formed(token: &str) -> bool {
    let token = token.trim();
    let len = token.chars().count();

    !token.is_empty()
        && (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&len)
        && token.chars().all(|c| c.is_ascii_digit())
}

/// Removes exactly one leading and one trailing character.
///
/// Models collector firmware that wraps a 13-digit EAN with one extra digit
/// on each side. Tokens shorter than 3 characters come back trimmed but
/// otherwise unchanged.
pub fn strip_edge_digits(token: &str) -> String {
    let token = token.trim();

    if token.chars().count() < 3 {
        return token.to_string();
    }

    let mut chars = token.chars();
    chars.next();
    chars.next_back();
    chars.as_str().to_string()
}

/// Extracts the centered 13-character core of a code.
///
/// Extra digits are removed symmetrically: `ceil(extra / 2)` from the front,
/// `floor(extra / 2)` from the back. Returns `None` below 13 characters.
///
/// ## Example
/// ```rust
/// use picking_core::barcode::extract_core13;
///
/// assert_eq!(extract_core13("00789123456789011").as_deref(), Some("7891234567890"));
/// assert_eq!(extract_core13("123"), None);
/// ```
pub fn extract_core13(token: &str) -> Option<String> {
    let token = token.trim();
    let len = token.chars().count();

    if len < EAN13_LEN {
        return None;
    }

    let extra = len - EAN13_LEN;
    let front = extra.div_ceil(2);

    Some(token.chars().skip(front).take(EAN13_LEN).collect())
}

// =============================================================================
// EAN-13 Checksum (auxiliary)
// =============================================================================

/// Computes the EAN-13 check digit for the first 12 digits.
///
/// Weights alternate 1/3 starting with 1 on the leftmost digit.
/// Returns `None` unless given exactly 12 ASCII digits.
pub fn ean13_check_digit(first12: &str) -> Option<u8> {
    if first12.len() != 12 || !first12.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let sum: u32 = first12
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 0 {
                digit
            } else {
                digit * 3
            }
        })
        .sum();

    Some(((10 - (sum % 10)) % 10) as u8)
}

/// Checks a 13-digit code against its own check digit.
pub fn has_valid_ean13_checksum(code: &str) -> bool {
    let code = code.trim();
    if code.len() != EAN13_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let provided = code.as_bytes()[12] - b'0';
    ean13_check_digit(&code[..12]) == Some(provided)
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolves a token against a list of barcodes with default options.
///
/// Returns the index of the matching barcode. Deterministic: identical
/// inputs always produce the same index.
pub fn resolve<S: AsRef<str>>(token: &str, barcodes: &[S]) -> Option<usize> {
    resolve_with_stage(token, barcodes, &MatchOptions::default()).map(|m| m.index)
}

/// Resolves a token and reports which cascade stage matched.
pub fn resolve_with_stage<S: AsRef<str>>(
    token: &str,
    barcodes: &[S],
    options: &MatchOptions,
) -> Option<Match> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let found = exact(token, barcodes)
        .or_else(|| stripped_token(token, barcodes))
        .or_else(|| stripped_barcode(token, barcodes))
        .or_else(|| {
            if !options.fuzzy_enabled {
                return None;
            }
            containment(token, barcodes)
                .or_else(|| core13(token, barcodes))
                .or_else(|| common_run(token, barcodes, options.min_common_run))
        });

    match found {
        Some(m) => debug!(
            token = %token,
            barcode = %barcodes[m.index].as_ref(),
            stage = %m.stage,
            "Token resolved"
        ),
        None => debug!(token = %token, candidates = barcodes.len(), "Token not resolved"),
    }

    found
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn hit(index: usize, stage: MatchStage) -> Match {
    Match { index, stage }
}

/// Stage 1: exact equality.
fn exact<S: AsRef<str>>(token: &str, barcodes: &[S]) -> Option<Match> {
    barcodes
        .iter()
        .position(|b| b.as_ref() == token)
        .map(|i| hit(i, MatchStage::Exact))
}

/// Stage 2: token longer than 13, edges stripped.
fn stripped_token<S: AsRef<str>>(token: &str, barcodes: &[S]) -> Option<Match> {
    if char_len(token) <= EAN13_LEN {
        return None;
    }

    let stripped = strip_edge_digits(token);
    barcodes
        .iter()
        .position(|b| b.as_ref() == stripped)
        .map(|i| hit(i, MatchStage::StrippedToken))
}

/// Stage 3: stored barcode longer than 13, edges stripped.
fn stripped_barcode<S: AsRef<str>>(token: &str, barcodes: &[S]) -> Option<Match> {
    barcodes
        .iter()
        .position(|b| {
            let b = b.as_ref();
            char_len(b) > EAN13_LEN && strip_edge_digits(b) == token
        })
        .map(|i| hit(i, MatchStage::StrippedBarcode))
}

/// Stage 4: bidirectional containment, both sides at least 13 long.
fn containment<S: AsRef<str>>(token: &str, barcodes: &[S]) -> Option<Match> {
    if char_len(token) < EAN13_LEN {
        return None;
    }

    barcodes
        .iter()
        .position(|b| {
            let b = b.as_ref();
            char_len(b) >= EAN13_LEN && (token.contains(b) || b.contains(token))
        })
        .map(|i| hit(i, MatchStage::Containment))
}

/// Stage 5: centered 13-digit cores equal or containing each other.
fn core13<S: AsRef<str>>(token: &str, barcodes: &[S]) -> Option<Match> {
    let token_core = extract_core13(token)?;

    barcodes
        .iter()
        .position(|b| match extract_core13(b.as_ref()) {
            Some(core) => {
                core == token_core || core.contains(&token_core) || token_core.contains(&core)
            }
            None => false,
        })
        .map(|i| hit(i, MatchStage::Core13))
}

/// Stage 6: longest common run of at least `min_run` characters.
///
/// Every barcode is scored by the longest window (from `min(len)` down to
/// `min_run`) that also occurs in the token. The highest score wins; ties
/// go to the earliest barcode.
fn common_run<S: AsRef<str>>(token: &str, barcodes: &[S], min_run: usize) -> Option<Match> {
    let min_run = min_run.max(1);
    if char_len(token) < min_run {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;

    for (index, barcode) in barcodes.iter().enumerate() {
        let Some(run) = longest_shared_run(token, barcode.as_ref(), min_run) else {
            continue;
        };

        // Strictly greater keeps the first barcode on ties
        if best.map_or(true, |(_, best_run)| run > best_run) {
            best = Some((index, run));
        }
    }

    best.map(|(index, _)| hit(index, MatchStage::CommonRun))
}

/// Longest window of `barcode` (at least `min_run` long) found in `token`.
fn longest_shared_run(token: &str, barcode: &str, min_run: usize) -> Option<usize> {
    let bounds: Vec<usize> = barcode
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(barcode.len()))
        .collect();
    let barcode_len = bounds.len() - 1;

    if barcode_len < min_run {
        return None;
    }

    let max_size = barcode_len.min(char_len(token));

    (min_run..=max_size).rev().find(|&size| {
        (0..=barcode_len - size).any(|start| token.contains(&barcode[bounds[start]..bounds[start + size]]))
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
