//! Model schemas, field metadata, and local schema checking.
//!
//! Schemas are fetched from the store's `models/{model}/` endpoint and used
//! for two local concerns: rejecting tables that cannot load (before any
//! upload happens) and generating field templates for data authoring.
//!
//! Foreign-key columns always travel under an `_id`-suffixed name; the bare
//! relation name is never a valid wire column.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BulkError;
use crate::table::column::{ColumnType, Table};

/// Per-field metadata of a remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Bare field name as the model defines it.
    pub name: String,
    /// Store-side logical type label (e.g. `CharField`, `ForeignKey`).
    #[serde(rename = "type")]
    pub logical_type: String,
    /// Type the field takes on the wire.
    pub wire_type: ColumnType,
    /// Whether NULL is accepted.
    #[serde(default)]
    pub nullable: bool,
    /// Whether this is the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Target model when the field is a foreign key.
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Maximum text length, when bounded.
    #[serde(default)]
    pub max_length: Option<u32>,
    /// Server-side default value.
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSchema {
    /// The name this field takes in wire payloads.
    ///
    /// Foreign keys get the `_id` suffix; everything else is unchanged.
    pub fn wire_name(&self) -> String {
        if self.foreign_key.is_some() && !self.name.ends_with("_id") {
            format!("{}_id", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Summary row from the `models/` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Full model identifier (e.g. `dcim.device`).
    pub model: String,
    /// Application label portion.
    pub app_label: String,
    /// Model name portion.
    pub model_name: String,
}

/// Full schema of a remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Full model identifier.
    pub model: String,
    /// Field metadata.
    pub fields: Vec<FieldSchema>,
    /// Named constraints usable as upsert conflict targets.
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl ModelSchema {
    /// The primary-key field, when the model declares one.
    pub fn primary_key(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Look up a field by its wire name.
    pub fn field_by_wire_name(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.wire_name() == name)
    }

    /// Look up a field by its bare model name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Generate a template row for authoring data files.
    ///
    /// Primary keys are skipped (server-assigned). Optional fields (nullable
    /// with a server default) are skipped unless `include_optional` is set.
    /// Foreign keys appear under their `_id` wire name. Values are the
    /// server default when present, otherwise a type-appropriate zero value.
    pub fn template(&self, include_optional: bool) -> serde_json::Map<String, Value> {
        let mut template = serde_json::Map::new();
        for field in &self.fields {
            if field.primary_key {
                continue;
            }
            if field.nullable && field.default.is_some() && !include_optional {
                continue;
            }
            let value = match &field.default {
                Some(default) => default.clone(),
                None => match field.wire_type {
                    ColumnType::Text | ColumnType::Date | ColumnType::Timestamp => {
                        Value::String(String::new())
                    }
                    ColumnType::Decimal => Value::String("0".to_string()),
                    ColumnType::BigInt | ColumnType::Int => Value::from(0),
                    ColumnType::Bool => Value::Bool(false),
                    ColumnType::TextList => Value::Array(Vec::new()),
                    ColumnType::Json => Value::Object(serde_json::Map::new()),
                },
            };
            template.insert(field.wire_name(), value);
        }
        template
    }
}

impl Table {
    /// Check this table against a target model schema.
    ///
    /// Runs entirely locally, before any network call. Unknown columns and
    /// wire-type conflicts are rejected with `SchemaMismatch` naming the
    /// column; a bare relation name where the `_id` form is required gets a
    /// pointed message.
    pub fn check_against(&self, schema: &ModelSchema) -> Result<(), BulkError> {
        for (name, column) in self.columns() {
            let field = match schema.field_by_wire_name(name) {
                Some(field) => field,
                None => {
                    // A bare FK relation name is the most common authoring slip.
                    if let Some(fk) = schema.field(name).filter(|f| f.foreign_key.is_some()) {
                        return Err(BulkError::SchemaMismatch {
                            column: name.to_string(),
                            message: format!(
                                "foreign key columns use the identifier form '{}'",
                                fk.wire_name()
                            ),
                        });
                    }
                    return Err(BulkError::SchemaMismatch {
                        column: name.to_string(),
                        message: format!("model '{}' has no such column", schema.model),
                    });
                }
            };
            if field.wire_type != column.column_type() {
                return Err(BulkError::SchemaMismatch {
                    column: name.to_string(),
                    message: format!(
                        "column is {}, model expects {}",
                        column.column_type(),
                        field.wire_type
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::column::Column;
    use serde_json::json;

    fn device_schema() -> ModelSchema {
        ModelSchema {
            model: "dcim.device".to_string(),
            fields: vec![
                FieldSchema {
                    name: "id".to_string(),
                    logical_type: "AutoField".to_string(),
                    wire_type: ColumnType::BigInt,
                    nullable: false,
                    primary_key: true,
                    foreign_key: None,
                    max_length: None,
                    default: None,
                },
                FieldSchema {
                    name: "name".to_string(),
                    logical_type: "CharField".to_string(),
                    wire_type: ColumnType::Text,
                    nullable: false,
                    primary_key: false,
                    foreign_key: None,
                    max_length: Some(64),
                    default: None,
                },
                FieldSchema {
                    name: "site".to_string(),
                    logical_type: "ForeignKey".to_string(),
                    wire_type: ColumnType::BigInt,
                    nullable: false,
                    primary_key: false,
                    foreign_key: Some("dcim.site".to_string()),
                    max_length: None,
                    default: None,
                },
                FieldSchema {
                    name: "comments".to_string(),
                    logical_type: "TextField".to_string(),
                    wire_type: ColumnType::Text,
                    nullable: true,
                    primary_key: false,
                    foreign_key: None,
                    max_length: None,
                    default: Some(json!("")),
                },
            ],
            constraints: vec!["unique_device_name_per_site".to_string()],
        }
    }

    #[test]
    fn fk_fields_take_the_id_suffix() {
        let schema = device_schema();
        assert_eq!(schema.field("site").unwrap().wire_name(), "site_id");
        assert_eq!(schema.field("name").unwrap().wire_name(), "name");
    }

    #[test]
    fn template_skips_pk_and_optional_fields() {
        let schema = device_schema();
        let template = schema.template(false);
        assert!(!template.contains_key("id"));
        assert!(!template.contains_key("comments"));
        assert_eq!(template["name"], json!(""));
        assert_eq!(template["site_id"], json!(0));
    }

    #[test]
    fn template_include_optional_uses_defaults() {
        let schema = device_schema();
        let template = schema.template(true);
        assert_eq!(template["comments"], json!(""));
    }

    #[test]
    fn check_accepts_matching_table() {
        let schema = device_schema();
        let table = Table::new()
            .with_column("name", Column::Text(vec![Some("sw1".into())]))
            .unwrap()
            .with_column("site_id", Column::BigInt(vec![Some(1)]))
            .unwrap();
        assert!(table.check_against(&schema).is_ok());
    }

    #[test]
    fn check_rejects_bare_fk_name_with_hint() {
        let schema = device_schema();
        let table = Table::new()
            .with_column("site", Column::BigInt(vec![Some(1)]))
            .unwrap();
        match table.check_against(&schema).unwrap_err() {
            BulkError::SchemaMismatch { column, message } => {
                assert_eq!(column, "site");
                assert!(message.contains("site_id"));
            }
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[test]
    fn check_rejects_unknown_column() {
        let schema = device_schema();
        let table = Table::new()
            .with_column("rack_units", Column::Int(vec![Some(42)]))
            .unwrap();
        match table.check_against(&schema).unwrap_err() {
            BulkError::SchemaMismatch { column, .. } => assert_eq!(column, "rack_units"),
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[test]
    fn check_rejects_wire_type_conflict() {
        let schema = device_schema();
        let table = Table::new()
            .with_column("name", Column::Int(vec![Some(5)]))
            .unwrap();
        match table.check_against(&schema).unwrap_err() {
            BulkError::SchemaMismatch { column, message } => {
                assert_eq!(column, "name");
                assert!(message.contains("int"));
                assert!(message.contains("text"));
            }
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[test]
    fn schema_round_trips_through_serde() {
        let schema = device_schema();
        let json = serde_json::to_string(&schema).unwrap();
        let back: ModelSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }
}
