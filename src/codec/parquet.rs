//! Columnar Parquet codec.
//!
//! Columns map to native Arrow types where one exists (text, integers,
//! booleans, string lists). Date, timestamp, decimal, and JSON columns are
//! carried as UTF-8 with their logical type recorded in Arrow field metadata,
//! which the writer embeds in the container and the reader restores, so the
//! round trip re-tags them exactly. Containers are Snappy-compressed.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Int32Array, Int64Array, ListArray, ListBuilder, StringArray,
    StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::BulkError;
use crate::table::{Column, ColumnType, Table};

/// Field metadata key recording the column's logical type.
const LOGICAL_TYPE_KEY: &str = "logical_type";

fn corrupt(message: impl Into<String>) -> BulkError {
    BulkError::CorruptData {
        message: message.into(),
    }
}

fn field_for(name: &str, column_type: ColumnType) -> Field {
    let data_type = match column_type {
        ColumnType::Text
        | ColumnType::Date
        | ColumnType::Timestamp
        | ColumnType::Decimal
        | ColumnType::Json => DataType::Utf8,
        ColumnType::BigInt => DataType::Int64,
        ColumnType::Int => DataType::Int32,
        ColumnType::Bool => DataType::Boolean,
        ColumnType::TextList => {
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
        }
    };
    Field::new(name, data_type, true).with_metadata(HashMap::from([(
        LOGICAL_TYPE_KEY.to_string(),
        column_type.as_str().to_string(),
    )]))
}

fn column_to_array(column: &Column) -> Result<ArrayRef, BulkError> {
    let array: ArrayRef = match column {
        Column::Text(v) | Column::Date(v) | Column::Timestamp(v) | Column::Decimal(v) => {
            Arc::new(StringArray::from(v.clone()))
        }
        Column::Json(v) => {
            let rendered: Vec<Option<String>> = v
                .iter()
                .map(|value| {
                    value
                        .as_ref()
                        .map(|doc| {
                            serde_json::to_string(doc)
                                .map_err(|e| corrupt(format!("unserializable JSON value: {e}")))
                        })
                        .transpose()
                })
                .collect::<Result<_, _>>()?;
            Arc::new(StringArray::from(rendered))
        }
        Column::BigInt(v) => Arc::new(Int64Array::from(v.clone())),
        Column::Int(v) => Arc::new(Int32Array::from(v.clone())),
        Column::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
        Column::TextList(v) => {
            let mut builder = ListBuilder::new(StringBuilder::new());
            for entry in v {
                match entry {
                    Some(items) => {
                        for item in items {
                            builder.values().append_value(item);
                        }
                        builder.append(true);
                    }
                    None => builder.append(false),
                }
            }
            Arc::new(builder.finish())
        }
    };
    Ok(array)
}

/// Encode a table as a Snappy-compressed Parquet container.
pub fn encode(table: &Table) -> Result<Vec<u8>, BulkError> {
    let fields: Vec<Field> = table
        .columns()
        .map(|(name, column)| field_for(name, column.column_type()))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<ArrayRef> = table
        .columns()
        .map(|(_, column)| column_to_array(column))
        .collect::<Result<_, _>>()?;

    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| corrupt(format!("failed to assemble record batch: {e}")))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut out = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut out, schema, Some(props))
        .map_err(|e| corrupt(format!("failed to open parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| corrupt(format!("failed to write parquet data: {e}")))?;
    writer
        .close()
        .map_err(|e| corrupt(format!("failed to finish parquet container: {e}")))?;
    Ok(out)
}

fn column_type_of(field: &Field) -> Result<ColumnType, BulkError> {
    if let Some(tag) = field.metadata().get(LOGICAL_TYPE_KEY) {
        return serde_json::from_value(serde_json::Value::String(tag.clone())).map_err(|_| {
            corrupt(format!(
                "column '{}' has unknown logical type tag '{tag}'",
                field.name()
            ))
        });
    }
    // Foreign containers carry no tag; fall back to the physical Arrow type.
    match field.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => Ok(ColumnType::Text),
        DataType::Int64 => Ok(ColumnType::BigInt),
        DataType::Int32 => Ok(ColumnType::Int),
        DataType::Boolean => Ok(ColumnType::Bool),
        DataType::List(inner) if inner.data_type() == &DataType::Utf8 => Ok(ColumnType::TextList),
        other => Err(corrupt(format!(
            "column '{}' has unsupported type {other}",
            field.name()
        ))),
    }
}

fn push_text_values(
    target: &mut Vec<Option<String>>,
    array: &dyn Array,
    name: &str,
) -> Result<(), BulkError> {
    let strings = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| corrupt(format!("column '{name}' is not a string array")))?;
    for i in 0..strings.len() {
        target.push(if strings.is_null(i) {
            None
        } else {
            Some(strings.value(i).to_string())
        });
    }
    Ok(())
}

/// Decode a Parquet container into a table.
///
/// # Errors
///
/// `CorruptData` on truncated containers, unsupported column types, or JSON
/// columns holding unparseable documents.
pub fn decode(bytes: &[u8]) -> Result<Table, BulkError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))
        .map_err(|e| corrupt(format!("invalid parquet container: {e}")))?
        .build()
        .map_err(|e| corrupt(format!("failed to open parquet reader: {e}")))?;

    let schema = reader.schema();
    let mut columns: Vec<(String, Column)> = schema
        .fields()
        .iter()
        .map(|field| {
            column_type_of(field).map(|ct| (field.name().clone(), ct.empty_column()))
        })
        .collect::<Result<_, _>>()?;

    for batch in reader {
        let batch = batch.map_err(|e| corrupt(format!("failed to read parquet data: {e}")))?;
        for (idx, (name, column)) in columns.iter_mut().enumerate() {
            let array = batch.column(idx);
            match column {
                Column::Text(v) | Column::Date(v) | Column::Timestamp(v) | Column::Decimal(v) => {
                    push_text_values(v, array.as_ref(), name)?;
                }
                Column::Json(v) => {
                    let mut rendered = Vec::new();
                    push_text_values(&mut rendered, array.as_ref(), name)?;
                    for entry in rendered {
                        match entry {
                            Some(text) => {
                                let doc = serde_json::from_str(&text).map_err(|e| {
                                    corrupt(format!("column '{name}': invalid JSON document: {e}"))
                                })?;
                                v.push(Some(doc));
                            }
                            None => v.push(None),
                        }
                    }
                }
                Column::BigInt(v) => {
                    let ints = array
                        .as_any()
                        .downcast_ref::<Int64Array>()
                        .ok_or_else(|| corrupt(format!("column '{name}' is not int64")))?;
                    for i in 0..ints.len() {
                        v.push((!ints.is_null(i)).then(|| ints.value(i)));
                    }
                }
                Column::Int(v) => {
                    let ints = array
                        .as_any()
                        .downcast_ref::<Int32Array>()
                        .ok_or_else(|| corrupt(format!("column '{name}' is not int32")))?;
                    for i in 0..ints.len() {
                        v.push((!ints.is_null(i)).then(|| ints.value(i)));
                    }
                }
                Column::Bool(v) => {
                    let bools = array
                        .as_any()
                        .downcast_ref::<BooleanArray>()
                        .ok_or_else(|| corrupt(format!("column '{name}' is not boolean")))?;
                    for i in 0..bools.len() {
                        v.push((!bools.is_null(i)).then(|| bools.value(i)));
                    }
                }
                Column::TextList(v) => {
                    let lists = array
                        .as_any()
                        .downcast_ref::<ListArray>()
                        .ok_or_else(|| corrupt(format!("column '{name}' is not a list array")))?;
                    for i in 0..lists.len() {
                        if lists.is_null(i) {
                            v.push(None);
                            continue;
                        }
                        let items = lists.value(i);
                        let mut entry = Vec::new();
                        push_text_values(&mut entry, items.as_ref(), name)?;
                        v.push(Some(
                            entry
                                .into_iter()
                                .map(|s| {
                                    s.ok_or_else(|| {
                                        corrupt(format!("column '{name}': null list item"))
                                    })
                                })
                                .collect::<Result<Vec<_>, _>>()?,
                        ));
                    }
                }
            }
        }
    }

    let mut table = Table::new();
    for (name, column) in columns {
        table.insert(name, column)?;
    }
    Ok(table)
}
