//! Slot value model: declared value kinds with their validation metadata,
//! typed values, and the string coercion/rendering pair used at the device
//! boundary. Rendering is the exact inverse of coercion for every kind.

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

/// Access direction of a slot, from the hosting framework's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn readable(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Kind of one table column, with enumeration labels attached where the
/// column is label-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Uint,
    Enum(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumnKind {
    pub name: String,
    pub kind: ColumnKind,
}

/// Declared kind of a slot. Bounds and label sets ride along as validation
/// metadata — they are never dropped once a descriptor declares them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Str,
    Bool,
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Uint {
        max: Option<u64>,
    },
    Float,
    Enum {
        labels: Vec<String>,
    },
    Table {
        columns: Vec<TableColumnKind>,
    },
}

impl ValueKind {
    pub fn plain_int() -> Self {
        Self::Int {
            min: None,
            max: None,
        }
    }

    pub fn bounded_int(min: i64, max: i64) -> Self {
        Self::Int {
            min: Some(min),
            max: Some(max),
        }
    }
}

/// One cell of a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Int(i32),
    Uint(u32),
    Enum(String),
}

/// A typed slot value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Enum(String),
    Table(Vec<Vec<Cell>>),
}

impl Value {
    /// Render into the device string form. Bools render as `0`/`1`, enums as
    /// their label, tables as space-joined cells row-major — each the exact
    /// inverse of [`coerce`] / write-path validation.
    pub fn render(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Uint(n) => n.to_string(),
            Self::Float(x) => x.to_string(),
            Self::Enum(label) => label.clone(),
            Self::Table(rows) => rows
                .iter()
                .flat_map(|row| row.iter())
                .map(Cell::render)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Uint(n) => n.to_string(),
            Self::Enum(label) => label.clone(),
        }
    }
}

/// Coerce one raw changeset string into a typed value of the declared kind.
/// Bounds and label membership are enforced here so that a polled value can
/// never land outside a slot's declared metadata.
pub fn coerce(kind: &ValueKind, raw: &str) -> Result<Value> {
    let raw = raw.trim();
    match kind {
        ValueKind::Str => Ok(Value::Str(raw.to_string())),
        ValueKind::Bool => {
            let n: i64 = raw
                .parse()
                .map_err(|_| coercion_error("bool", raw))?;
            Ok(Value::Bool(n != 0))
        }
        ValueKind::Int { min, max } => {
            let n: i64 = raw.parse().map_err(|_| coercion_error("int", raw))?;
            check_int_bounds(n, *min, *max)?;
            Ok(Value::Int(n))
        }
        ValueKind::Uint { max } => {
            let n: u64 = raw.parse().map_err(|_| coercion_error("uint", raw))?;
            check_uint_bound(n, *max)?;
            Ok(Value::Uint(n))
        }
        ValueKind::Float => {
            let x: f64 = raw.parse().map_err(|_| coercion_error("float", raw))?;
            Ok(Value::Float(x))
        }
        ValueKind::Enum { labels } => {
            if labels.iter().any(|l| l == raw) {
                Ok(Value::Enum(raw.to_string()))
            } else {
                Err(MirrorError::Coercion(format!(
                    "`{raw}` is not one of {labels:?}"
                )))
            }
        }
        ValueKind::Table { .. } => Err(MirrorError::Coercion(
            "table values are not delivered as single change entries".to_string(),
        )),
    }
}

/// Validate an already-typed value against a declared kind: variant match,
/// bounds, label membership, table row shape.
pub fn validate(kind: &ValueKind, value: &Value) -> Result<()> {
    match (kind, value) {
        (ValueKind::Str, Value::Str(_)) => Ok(()),
        (ValueKind::Bool, Value::Bool(_)) => Ok(()),
        (ValueKind::Int { min, max }, Value::Int(n)) => check_int_bounds(*n, *min, *max),
        (ValueKind::Uint { max }, Value::Uint(n)) => check_uint_bound(*n, *max),
        (ValueKind::Float, Value::Float(_)) => Ok(()),
        (ValueKind::Enum { labels }, Value::Enum(label)) => {
            if labels.iter().any(|l| l == label) {
                Ok(())
            } else {
                Err(MirrorError::Coercion(format!(
                    "`{label}` is not one of {labels:?}"
                )))
            }
        }
        (ValueKind::Table { columns }, Value::Table(rows)) => {
            for (row_index, row) in rows.iter().enumerate() {
                if row.len() != columns.len() {
                    return Err(MirrorError::Coercion(format!(
                        "row {row_index} has {} cells, schema has {} columns",
                        row.len(),
                        columns.len()
                    )));
                }
                for (cell, column) in row.iter().zip(columns) {
                    validate_cell(cell, column, row_index)?;
                }
            }
            Ok(())
        }
        (kind, value) => Err(MirrorError::Coercion(format!(
            "value {value:?} does not fit declared kind {kind:?}"
        ))),
    }
}

fn validate_cell(cell: &Cell, column: &TableColumnKind, row_index: usize) -> Result<()> {
    match (&column.kind, cell) {
        (ColumnKind::Int, Cell::Int(_)) => Ok(()),
        (ColumnKind::Uint, Cell::Uint(_)) => Ok(()),
        (ColumnKind::Enum(labels), Cell::Enum(label)) => {
            if labels.iter().any(|l| l == label) {
                Ok(())
            } else {
                Err(MirrorError::Coercion(format!(
                    "row {row_index} column `{}`: `{label}` is not one of {labels:?}",
                    column.name
                )))
            }
        }
        (kind, cell) => Err(MirrorError::Coercion(format!(
            "row {row_index} column `{}`: cell {cell:?} does not fit {kind:?}",
            column.name
        ))),
    }
}

fn coercion_error(kind: &str, raw: &str) -> MirrorError {
    MirrorError::Coercion(format!("`{raw}` is not a valid {kind}"))
}

fn check_int_bounds(n: i64, min: Option<i64>, max: Option<i64>) -> Result<()> {
    if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
        return Err(MirrorError::Coercion(format!(
            "{n} outside bounds [{}, {}]",
            min.map_or("-inf".to_string(), |m| m.to_string()),
            max.map_or("inf".to_string(), |m| m.to_string()),
        )));
    }
    Ok(())
}

fn check_uint_bound(n: u64, max: Option<u64>) -> Result<()> {
    match max {
        Some(m) if n > m => Err(MirrorError::Coercion(format!("{n} above maximum {m}"))),
        _ => Ok(()),
    }
}
