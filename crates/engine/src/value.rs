use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single cell of a dataset.
///
/// Values are totally ordered so they can key groups and rectangularization
/// products: `Null` sorts first, then numbers, then text. Integers and floats
/// compare numerically but stay distinct values (`Int(1) != Float(1.0)`);
/// on a numeric tie the integer sorts first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
}

impl Value {
    pub fn float(v: f64) -> Self {
        Self::Float(OrderedFloat(v))
    }

    /// Infer a value from a raw text field: empty is null, then integer,
    /// then float, otherwise text.
    pub fn parse_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::float(f);
            }
        }
        Self::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    fn numeric_rank(&self) -> u8 {
        match self {
            Self::Int(_) => 0,
            _ => 1,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), _) => Ordering::Greater,
            (_, Self::Text(_)) => Ordering::Less,
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.cmp(b),
            (a, b) => {
                let x = OrderedFloat(a.as_f64().unwrap_or_default());
                let y = OrderedFloat(b.as_f64().unwrap_or_default());
                x.cmp(&y).then_with(|| a.numeric_rank().cmp(&b.numeric_rank()))
            }
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{}", v.into_inner()),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Column-named, row-ordered rectangular data. Every row has exactly one
/// value per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, EngineError> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, EngineError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| EngineError::MissingColumn(name.to_string()))
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), EngineError> {
        if row.len() != self.columns.len() {
            return Err(EngineError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a column. `values` must have one entry per existing row.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), EngineError> {
        if self.has_column(name) {
            return Err(EngineError::DuplicateColumn(name.to_string()));
        }
        if values.len() != self.rows.len() {
            return Err(EngineError::RowWidth {
                row: self.rows.len().min(values.len()),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value> + '_, EngineError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column).ok()?;
        self.rows.get(row).map(|r| &r[idx])
    }
}
