//! Typed columns and the ordered table container.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BulkError;

/// Wire-level type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    #[serde(rename = "bigint")]
    BigInt,
    /// 32-bit signed integer.
    Int,
    /// Boolean.
    Bool,
    /// ISO-8601 date, carried as text.
    Date,
    /// ISO-8601 timestamp, carried as text.
    Timestamp,
    /// Arbitrary-precision decimal, carried as text.
    Decimal,
    /// List of UTF-8 strings.
    TextList,
    /// JSON document.
    Json,
}

impl ColumnType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::BigInt => "bigint",
            ColumnType::Int => "int",
            ColumnType::Bool => "bool",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Decimal => "decimal",
            ColumnType::TextList => "text_list",
            ColumnType::Json => "json",
        }
    }

    /// An empty column of this type.
    pub fn empty_column(&self) -> Column {
        match self {
            ColumnType::Text => Column::Text(Vec::new()),
            ColumnType::BigInt => Column::BigInt(Vec::new()),
            ColumnType::Int => Column::Int(Vec::new()),
            ColumnType::Bool => Column::Bool(Vec::new()),
            ColumnType::Date => Column::Date(Vec::new()),
            ColumnType::Timestamp => Column::Timestamp(Vec::new()),
            ColumnType::Decimal => Column::Decimal(Vec::new()),
            ColumnType::TextList => Column::TextList(Vec::new()),
            ColumnType::Json => Column::Json(Vec::new()),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A homogeneous, nullable column of values.
///
/// Date, timestamp, and decimal values are carried as their ISO / canonical
/// text forms; the codec preserves them byte-for-byte, so nothing is lost to
/// formatting or precision.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// UTF-8 text values.
    Text(Vec<Option<String>>),
    /// 64-bit integers.
    BigInt(Vec<Option<i64>>),
    /// 32-bit integers.
    Int(Vec<Option<i32>>),
    /// Booleans.
    Bool(Vec<Option<bool>>),
    /// ISO-8601 dates as text.
    Date(Vec<Option<String>>),
    /// ISO-8601 timestamps as text.
    Timestamp(Vec<Option<String>>),
    /// Decimals as text.
    Decimal(Vec<Option<String>>),
    /// Nested string lists.
    TextList(Vec<Option<Vec<String>>>),
    /// JSON documents.
    Json(Vec<Option<Value>>),
}

impl Column {
    /// Number of values (including nulls).
    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) | Column::Date(v) | Column::Timestamp(v) | Column::Decimal(v) => {
                v.len()
            }
            Column::BigInt(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::TextList(v) => v.len(),
            Column::Json(v) => v.len(),
        }
    }

    /// Whether the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire-level type of this column.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Text(_) => ColumnType::Text,
            Column::BigInt(_) => ColumnType::BigInt,
            Column::Int(_) => ColumnType::Int,
            Column::Bool(_) => ColumnType::Bool,
            Column::Date(_) => ColumnType::Date,
            Column::Timestamp(_) => ColumnType::Timestamp,
            Column::Decimal(_) => ColumnType::Decimal,
            Column::TextList(_) => ColumnType::TextList,
            Column::Json(_) => ColumnType::Json,
        }
    }

    /// The value at `idx` as a JSON value, `Null` for SQL-null.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn value_json(&self, idx: usize) -> Value {
        match self {
            Column::Text(v) | Column::Date(v) | Column::Timestamp(v) | Column::Decimal(v) => v
                [idx]
                .as_ref()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
            Column::BigInt(v) => v[idx].map(Value::from).unwrap_or(Value::Null),
            Column::Int(v) => v[idx].map(Value::from).unwrap_or(Value::Null),
            Column::Bool(v) => v[idx].map(Value::Bool).unwrap_or(Value::Null),
            Column::TextList(v) => v[idx]
                .as_ref()
                .map(|items| Value::Array(items.iter().cloned().map(Value::String).collect()))
                .unwrap_or(Value::Null),
            Column::Json(v) => v[idx].clone().unwrap_or(Value::Null),
        }
    }

    /// Append a JSON value, coercing `Null` to SQL-null.
    ///
    /// Fails when the value's shape does not match the column type; the codec
    /// turns that into a `CorruptData` report naming the offending column.
    pub fn push_json(&mut self, value: &Value) -> Result<(), String> {
        match self {
            Column::Text(v) | Column::Date(v) | Column::Timestamp(v) | Column::Decimal(v) => {
                match value {
                    Value::Null => v.push(None),
                    Value::String(s) => v.push(Some(s.clone())),
                    other => return Err(format!("expected string, got {other}")),
                }
            }
            Column::BigInt(v) => match value {
                Value::Null => v.push(None),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => v.push(Some(i)),
                    None => return Err(format!("integer out of 64-bit range: {n}")),
                },
                other => return Err(format!("expected integer, got {other}")),
            },
            Column::Int(v) => match value {
                Value::Null => v.push(None),
                Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                    Some(i) => v.push(Some(i)),
                    None => return Err(format!("integer out of 32-bit range: {n}")),
                },
                other => return Err(format!("expected integer, got {other}")),
            },
            Column::Bool(v) => match value {
                Value::Null => v.push(None),
                Value::Bool(b) => v.push(Some(*b)),
                other => return Err(format!("expected boolean, got {other}")),
            },
            Column::TextList(v) => match value {
                Value::Null => v.push(None),
                Value::Array(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(s) => list.push(s.clone()),
                            other => {
                                return Err(format!("expected string list item, got {other}"))
                            }
                        }
                    }
                    v.push(Some(list));
                }
                other => return Err(format!("expected string list, got {other}")),
            },
            Column::Json(v) => match value {
                Value::Null => v.push(None),
                other => v.push(Some(other.clone())),
            },
        }
        Ok(())
    }
}

/// An ordered set of uniquely named columns of equal length.
///
/// Column order is preserved for encoding, but identity is by name: two
/// tables are equal when they hold the same columns with the same values,
/// regardless of order. This is what makes codec round-trips insensitive to
/// column reordering.
///
/// # Example
///
/// ```
/// use bulklift_rs::table::{Column, Table};
///
/// let mut table = Table::new();
/// table
///     .insert("name", Column::Text(vec![Some("fra1".into()), Some("ams2".into())]))
///     .unwrap();
/// table
///     .insert("region_id", Column::BigInt(vec![Some(7), None]))
///     .unwrap();
/// assert_eq!(table.row_count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the name is empty or duplicated, or when the
    /// column's length differs from the columns already present.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<(), BulkError> {
        let name = name.into();
        if name.is_empty() {
            return Err(BulkError::InvalidRequest {
                message: "column name must not be empty".to_string(),
            });
        }
        if self.columns.iter().any(|(n, _)| *n == name) {
            return Err(BulkError::InvalidRequest {
                message: format!("duplicate column name '{name}'"),
            });
        }
        if let Some((_, first)) = self.columns.first() {
            if first.len() != column.len() {
                return Err(BulkError::InvalidRequest {
                    message: format!(
                        "column '{name}' has {} rows, table has {}",
                        column.len(),
                        first.len()
                    ),
                });
            }
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self, BulkError> {
        self.insert(name, column)?;
        Ok(self)
    }

    /// The column with the given name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Columns with their names, in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    /// Whether the table has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Row `idx` as a JSON object in column order.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn row_json(&self, idx: usize) -> serde_json::Map<String, Value> {
        let mut row = serde_json::Map::with_capacity(self.columns.len());
        for (name, column) in &self.columns {
            row.insert(name.clone(), column.value_json(idx));
        }
        row
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .all(|(name, column)| other.column(name) == Some(column))
    }
}
