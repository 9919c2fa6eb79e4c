//! In-memory table representation and model schemas.
//!
//! A [`Table`] is the unit of data handed to bulk loads and produced by
//! decoding wire payloads: an ordered set of uniquely named, homogeneously
//! typed columns. [`ModelSchema`] mirrors the remote store's per-model field
//! metadata and drives local schema checking and template generation.

pub mod column;
pub mod schema;

pub use column::{Column, ColumnType, Table};
pub use schema::{FieldSchema, ModelInfo, ModelSchema};
