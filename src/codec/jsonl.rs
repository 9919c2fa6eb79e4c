//! Row-delimited JSON codec.
//!
//! One JSON object per row, newline-delimited, optionally gzipped. The first
//! record is a schema header under the reserved `$schema` key pinning every
//! column's exact wire type, which is what lets Int survive next to BigInt
//! and dates survive next to plain text on the way back in.
//!
//! Files produced elsewhere may lack the header; decoding then falls back to
//! shape inference over all rows (integers widen to `bigint`, strings stay
//! `text`, anything mixed or fractional lands in `json`).

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BulkError;
use crate::table::{Column, ColumnType, Table};

/// Reserved key of the leading schema record.
pub const SCHEMA_KEY: &str = "$schema";

#[derive(Debug, Serialize, Deserialize)]
struct SchemaColumn {
    name: String,
    #[serde(rename = "type")]
    column_type: ColumnType,
}

fn corrupt(message: impl Into<String>) -> BulkError {
    BulkError::CorruptData {
        message: message.into(),
    }
}

/// Encode a table as row-delimited JSON, optionally gzipped.
pub fn encode(table: &Table, gzip: bool) -> Result<Vec<u8>, BulkError> {
    let mut out = Vec::new();

    let header: Vec<SchemaColumn> = table
        .columns()
        .map(|(name, column)| SchemaColumn {
            name: name.to_string(),
            column_type: column.column_type(),
        })
        .collect();
    let mut header_record = Map::new();
    header_record.insert(
        SCHEMA_KEY.to_string(),
        serde_json::to_value(&header).expect("schema header serializes"),
    );
    serde_json::to_writer(&mut out, &Value::Object(header_record))
        .map_err(|e| corrupt(format!("failed to write schema header: {e}")))?;
    out.push(b'\n');

    for idx in 0..table.row_count() {
        serde_json::to_writer(&mut out, &Value::Object(table.row_json(idx)))
            .map_err(|e| corrupt(format!("failed to write row {idx}: {e}")))?;
        out.push(b'\n');
    }

    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&out)?;
        Ok(encoder.finish()?)
    } else {
        Ok(out)
    }
}

/// Decode row-delimited JSON, optionally gzipped.
///
/// # Errors
///
/// `CorruptData` on truncated gzip streams, malformed JSON lines, rows that
/// do not match the schema header, or values whose shape conflicts with the
/// declared column type.
pub fn decode(bytes: &[u8], gzipped: bool) -> Result<Table, BulkError> {
    let text = if gzipped {
        let mut decoder = GzDecoder::new(bytes);
        let mut buf = Vec::new();
        decoder
            .read_to_end(&mut buf)
            .map_err(|e| corrupt(format!("gzip stream is truncated or invalid: {e}")))?;
        buf
    } else {
        bytes.to_vec()
    };
    let text =
        String::from_utf8(text).map_err(|e| corrupt(format!("payload is not UTF-8: {e}")))?;

    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| corrupt(format!("line {}: invalid JSON: {e}", line_no + 1)))?;
        match value {
            Value::Object(map) => records.push((line_no + 1, map)),
            other => {
                return Err(corrupt(format!(
                    "line {}: expected an object, got {other}",
                    line_no + 1
                )))
            }
        }
    }

    let has_header = records
        .first()
        .map(|(_, map)| map.contains_key(SCHEMA_KEY))
        .unwrap_or(false);
    let header = if has_header {
        let (_, map) = records.remove(0);
        let columns: Vec<SchemaColumn> = serde_json::from_value(map[SCHEMA_KEY].clone())
            .map_err(|e| corrupt(format!("invalid schema header: {e}")))?;
        Some(columns)
    } else {
        None
    };

    match header {
        Some(columns) => decode_with_header(&columns, &records),
        None => decode_inferred(&records),
    }
}

fn decode_with_header(
    header: &[SchemaColumn],
    records: &[(usize, Map<String, Value>)],
) -> Result<Table, BulkError> {
    let mut table = Table::new();
    let mut columns: Vec<Column> = header
        .iter()
        .map(|c| c.column_type.empty_column())
        .collect();

    for (line_no, row) in records {
        for key in row.keys() {
            if !header.iter().any(|c| c.name == *key) {
                return Err(corrupt(format!(
                    "line {line_no}: column '{key}' is not in the schema header"
                )));
            }
        }
        for (schema_col, column) in header.iter().zip(columns.iter_mut()) {
            let value = row.get(&schema_col.name).unwrap_or(&Value::Null);
            column.push_json(value).map_err(|e| {
                corrupt(format!(
                    "line {line_no}: column '{}': {e}",
                    schema_col.name
                ))
            })?;
        }
    }

    for (schema_col, column) in header.iter().zip(columns) {
        table.insert(&schema_col.name, column)?;
    }
    Ok(table)
}

/// Shape-infer column types for headerless files.
fn decode_inferred(records: &[(usize, Map<String, Value>)]) -> Result<Table, BulkError> {
    if records.is_empty() {
        return Err(corrupt("no records and no schema header"));
    }

    // Union of column names in first-seen order.
    let mut names: Vec<String> = Vec::new();
    for (_, row) in records {
        for key in row.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let mut table = Table::new();
    for name in &names {
        let inferred = infer_column_type(records.iter().map(|(_, row)| row.get(name)));
        let mut column = inferred.empty_column();
        for (line_no, row) in records {
            let value = row.get(name).unwrap_or(&Value::Null);
            column
                .push_json(value)
                .map_err(|e| corrupt(format!("line {line_no}: column '{name}': {e}")))?;
        }
        table.insert(name, column)?;
    }
    Ok(table)
}

fn infer_column_type<'a>(values: impl Iterator<Item = Option<&'a Value>>) -> ColumnType {
    let mut seen: Option<ColumnType> = None;
    for value in values.flatten() {
        let shape = match value {
            Value::Null => continue,
            Value::Bool(_) => ColumnType::Bool,
            Value::Number(n) if n.as_i64().is_some() => ColumnType::BigInt,
            Value::Number(_) => ColumnType::Json,
            Value::String(_) => ColumnType::Text,
            Value::Array(items) if items.iter().all(|i| i.is_string()) => ColumnType::TextList,
            Value::Array(_) | Value::Object(_) => ColumnType::Json,
        };
        seen = match seen {
            None => Some(shape),
            Some(prev) if prev == shape => Some(prev),
            // Conflicting shapes across rows: a JSON column takes anything.
            Some(_) => return ColumnType::Json,
        };
    }
    seen.unwrap_or(ColumnType::Text)
}
