//! # Manifest Payloads
//!
//! Normalises what the remote shipment service returns into a
//! [`ManifestInput`], and shapes what goes back after a finalize
//! ([`Settlement`]).
//!
//! ## Source Response Shapes
//! ```text
//! Wrapped (expected)                    Bare item array (legacy)
//! ──────────────────                    ────────────────────────
//! [                                     [
//!   {                                     { "codigo": "P-1",
//!     "ctrc": "CTRC-1",                     "ean": "789...",
//!     "remetente": "...",                   "quantidade": "12" },
//!     "itens": [ { "codigo": ... } ]      ...
//!   }                                   ]
//! ]
//!   header from the wrapper               header from the requested id,
//!                                         status "Em Separação"
//! ```
//!
//! Quantities arrive as JSON numbers or as numeric strings. They are parsed
//! leniently: a leading integer is taken, anything unparsable becomes 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{ItemStatus, LineItem, ManifestHeader, PickingRecord};
use crate::DEFAULT_MANIFEST_STATUS;

// =============================================================================
// Manifest Input
// =============================================================================

/// One raw line as loaded into a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManifestLine {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub barcode: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,

    /// Expected quantity.
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: i64,

    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: String,

    /// Pre-existing scanned quantity when resuming a partially picked
    /// manifest from the source system.
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub scanned_quantity: i64,
}

impl ManifestLine {
    /// Builds the session line. Negative quantities clamp to 0.
    pub fn to_line_item(&self) -> LineItem {
        LineItem::new(
            self.code.trim(),
            self.barcode.trim(),
            self.description.trim(),
            self.quantity.max(0),
            self.scanned_quantity.max(0),
            self.unit.trim(),
        )
    }
}

/// Header plus ordered lines: everything `load_manifest` needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManifestInput {
    pub header: ManifestHeader,
    pub lines: Vec<ManifestLine>,
}

impl ManifestInput {
    /// Normalises a remote service response.
    ///
    /// `manifest_id` is the id that was requested. It becomes the header id
    /// when the response is a bare item array.
    ///
    /// ## Example
    /// ```rust
    /// use picking_core::ManifestInput;
    /// use serde_json::json;
    ///
    /// let response = json!([
    ///     { "codigo": "P-1", "ean": "7891234567890", "produto": "Widget", "quantidade": "3", "unid": "CX" }
    /// ]);
    /// let input = ManifestInput::from_source_json(&response, "CTRC-77").unwrap();
    ///
    /// assert_eq!(input.header.manifest_id, "CTRC-77");
    /// assert_eq!(input.lines[0].quantity, 3);
    /// ```
    pub fn from_source_json(value: &Value, manifest_id: &str) -> CoreResult<ManifestInput> {
        let first = value
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| invalid("response is not a non-empty array"))?;

        if is_present(first, "ctrc") && is_present(first, "itens") {
            let wrapper: SourceManifest = serde_json::from_value(first.clone())
                .map_err(|e| invalid(format!("unreadable manifest wrapper: {}", e)))?;
            return Ok(wrapper.into());
        }

        if is_present(first, "ean") || is_present(first, "codigo") {
            let lines: Vec<SourceLine> = serde_json::from_value(value.clone())
                .map_err(|e| invalid(format!("unreadable item array: {}", e)))?;

            return Ok(ManifestInput {
                header: ManifestHeader {
                    manifest_id: manifest_id.trim().to_string(),
                    status: DEFAULT_MANIFEST_STATUS.to_string(),
                    ..Default::default()
                },
                lines: lines.into_iter().map(ManifestLine::from).collect(),
            });
        }

        Err(invalid("unrecognised response shape"))
    }

    /// Sets the operator responsible for this picking.
    pub fn with_operator(mut self, operator_name: impl Into<String>) -> Self {
        self.header.operator_name = operator_name.into();
        self
    }

    /// Sets the branch the operator is working from.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.header.branch = branch.into();
        self
    }
}

fn invalid(reason: impl Into<String>) -> CoreError {
    CoreError::InvalidManifest {
        reason: reason.into(),
    }
}

fn is_present(row: &Value, key: &str) -> bool {
    match row.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}

// =============================================================================
// Source Wire Format
// =============================================================================

#[derive(Debug, Deserialize)]
struct SourceManifest {
    #[serde(deserialize_with = "lenient_string")]
    ctrc: String,
    #[serde(default, deserialize_with = "lenient_string")]
    filial: String,
    #[serde(default, deserialize_with = "lenient_string")]
    remetente: String,
    #[serde(default, deserialize_with = "lenient_string")]
    destinatario: String,
    #[serde(default, deserialize_with = "lenient_string")]
    cidade: String,
    #[serde(default, deserialize_with = "lenient_string")]
    prev_entrega: String,
    #[serde(default, deserialize_with = "lenient_string")]
    status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    conferente: String,
    #[serde(default)]
    itens: Vec<SourceLine>,
}

#[derive(Debug, Deserialize)]
struct SourceLine {
    #[serde(default, deserialize_with = "lenient_string")]
    codigo: String,
    #[serde(default, deserialize_with = "lenient_string")]
    ean: String,
    #[serde(default, deserialize_with = "lenient_string")]
    produto: String,
    #[serde(default, deserialize_with = "lenient_quantity")]
    quantidade: i64,
    #[serde(default, deserialize_with = "lenient_quantity")]
    qtd_bipada: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    unid: String,
}

impl From<SourceLine> for ManifestLine {
    fn from(line: SourceLine) -> Self {
        ManifestLine {
            code: line.codigo,
            barcode: line.ean,
            description: line.produto,
            quantity: line.quantidade,
            unit: line.unid,
            scanned_quantity: line.qtd_bipada,
        }
    }
}

impl From<SourceManifest> for ManifestInput {
    fn from(source: SourceManifest) -> Self {
        let status = if source.status.trim().is_empty() {
            DEFAULT_MANIFEST_STATUS.to_string()
        } else {
            source.status
        };

        ManifestInput {
            header: ManifestHeader {
                manifest_id: source.ctrc.trim().to_string(),
                branch: source.filial,
                sender: source.remetente,
                receiver: source.destinatario,
                city: source.cidade,
                expected_delivery_date: source.prev_entrega,
                status,
                operator_name: source.conferente,
            },
            lines: source.itens.into_iter().map(ManifestLine::from).collect(),
        }
    }
}

// =============================================================================
// Lenient Parsing
// =============================================================================

/// Parses a leading integer the way the source system does.
///
/// `12`, `"12"`, `" 12 "`, `"12abc"` and `12.9` all yield 12.
/// Null, booleans, empty or non-numeric strings yield 0.
pub fn parse_lenient_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => leading_int(s),
        _ => 0,
    }
}

fn leading_int(raw: &str) -> i64 {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    match digits[..end].parse::<i64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) => 0,
    }
}

fn lenient_quantity<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_lenient_int(&value))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

// =============================================================================
// Settlement (egress)
// =============================================================================

/// One line forwarded to the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettlementLine {
    pub code: String,
    pub barcode: String,
    /// Final scanned quantity.
    pub quantity: i64,
    pub status: ItemStatus,
}

/// Payload the caller forwards after a successful finalize.
///
/// Sending it is outside the session: a failed submission never rolls back
/// the local finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    /// The [`PickingRecord`] this settlement was built from.
    pub record_id: String,
    pub manifest_id: String,
    #[ts(as = "String")]
    pub finished_at: DateTime<Utc>,
    pub lines: Vec<SettlementLine>,
}

impl Settlement {
    pub fn from_record(record: &PickingRecord) -> Self {
        Settlement {
            record_id: record.id.clone(),
            manifest_id: record.manifest_id.clone(),
            finished_at: record.finished_at,
            lines: record
                .items
                .iter()
                .map(|line| SettlementLine {
                    code: line.code.clone(),
                    barcode: line.barcode.clone(),
                    quantity: line.scanned_quantity,
                    status: line.status,
                })
                .collect(),
        }
    }

    /// Renders the request body the source service expects.
    pub fn to_source_payload(&self) -> Value {
        json!({
            "acao": "dar_baixa",
            "ctrc": self.manifest_id,
            "itens": self
                .lines
                .iter()
                .map(|l| json!({
                    "codigo": l.code,
                    "ean": l.barcode,
                    "qtd": l.quantity,
                    "status": l.status,
                }))
                .collect::<Vec<_>>(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
