//! Scalar values and raw cell representations.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of scalar types a record field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// Floating point
    Float,
    /// Fixed-point decimal
    Decimal,
    /// Boolean
    Bool,
    /// Calendar date-time
    Date,
    /// Text
    Text,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Int => "int",
            ScalarKind::Long => "long",
            ScalarKind::Float => "float",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Bool => "bool",
            ScalarKind::Date => "date",
            ScalarKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// A typed scalar value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
    Date(NaiveDateTime),
    Text(String),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Value::Int(_) => ScalarKind::Int,
            Value::Long(_) => ScalarKind::Long,
            Value::Float(_) => ScalarKind::Float,
            Value::Decimal(_) => ScalarKind::Decimal,
            Value::Bool(_) => ScalarKind::Bool,
            Value::Date(_) => ScalarKind::Date,
            Value::Text(_) => ScalarKind::Text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Raw content of a single cell as stored in the document.
///
/// Numbers keep their original decimal text so that fixed-point reads do
/// not pass through binary floating point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CellData {
    /// No value
    #[default]
    Empty,
    /// Text content
    Text(String),
    /// Numeric content in decimal text form
    Number(String),
    /// Boolean content
    Bool(bool),
}

impl CellData {
    /// Check if the cell holds no value.
    pub fn is_empty(&self) -> bool {
        matches!(self, CellData::Empty)
    }

    /// Text used for display width and title capture.
    pub fn display_text(&self) -> &str {
        match self {
            CellData::Empty => "",
            CellData::Text(s) | CellData::Number(s) => s,
            CellData::Bool(true) => "TRUE",
            CellData::Bool(false) => "FALSE",
        }
    }
}

/// A normalized cell emitted by a sheet parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEvent {
    /// Zero-based row index
    pub row: usize,
    /// Zero-based column index
    pub column: usize,
    /// Numeric format id of the cell style (numeric cells only)
    pub format_id: Option<u32>,
    /// Raw cell content
    pub data: CellData,
}

/// Declared type of an output cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Numeric,
    Text,
    Boolean,
}

/// A formatted cell produced by the write direction of coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellOutput {
    /// Declared cell type, kept even when there is no value
    pub cell_type: CellType,
    /// Cell content
    pub data: CellData,
    /// Number format code to apply
    pub format: Option<String>,
}

impl CellOutput {
    /// A text cell without a number format.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            cell_type: CellType::Text,
            data: CellData::Text(value.into()),
            format: None,
        }
    }
}
