//! Export request builder.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::codec::WireFormat;
use crate::error::BulkError;

/// A bulk export request.
///
/// The selection (model, filters, fields, custom-field/tag switches, format)
/// is also the export's cache identity: two requests with the same selection
/// share a cache entry until the underlying data changes.
///
/// # Example
///
/// ```
/// use bulklift_rs::request::ExportRequest;
///
/// let request = ExportRequest::new("dcim.device")
///     .filter("site_id", 1)
///     .fields(["name", "status"])
///     .include_tags(false);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Source model identifier.
    pub model: String,
    /// Filter parameters; sorted by key so the selection has one canonical
    /// form.
    pub filters: BTreeMap<String, Value>,
    /// Fields to export; empty means all.
    pub fields: Vec<String>,
    /// Include the custom-field data column.
    pub include_custom_fields: bool,
    /// Include the tags column.
    pub include_tags: bool,
    /// Wire format of the exported file.
    pub format: WireFormat,
    /// Bypass the cache and build a fresh export.
    pub force_refresh: bool,
    /// Only report cache status; never create a job.
    pub check_cache_only: bool,
    /// Explicit client cache key for not-modified checks. When unset, the
    /// client supplies the key of its stored entry for this selection.
    pub client_cache_key: Option<String>,
}

impl ExportRequest {
    /// Export everything from a model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            filters: BTreeMap::new(),
            fields: Vec::new(),
            include_custom_fields: true,
            include_tags: true,
            format: WireFormat::default(),
            force_refresh: false,
            check_cache_only: false,
            client_cache_key: None,
        }
    }

    /// Add a filter parameter.
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Restrict the export to these fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Include or exclude the custom-field data column.
    pub fn include_custom_fields(mut self, include: bool) -> Self {
        self.include_custom_fields = include;
        self
    }

    /// Include or exclude the tags column.
    pub fn include_tags(mut self, include: bool) -> Self {
        self.include_tags = include;
        self
    }

    /// Set the export file format.
    pub fn wire_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Bypass the cache and build a fresh export.
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Only report cache status; never create a job.
    pub fn check_cache_only(mut self, check_only: bool) -> Self {
        self.check_cache_only = check_only;
        self
    }

    /// Supply an explicit client cache key.
    pub fn client_cache_key(mut self, key: impl Into<String>) -> Self {
        self.client_cache_key = Some(key.into());
        self
    }

    /// Check construction rules.
    pub fn validate(&self) -> Result<(), BulkError> {
        if self.model.is_empty() {
            return Err(BulkError::InvalidRequest {
                message: "model identifier is required".to_string(),
            });
        }
        if self.force_refresh && self.check_cache_only {
            return Err(BulkError::InvalidRequest {
                message: "force_refresh and check_cache_only are mutually exclusive".to_string(),
            });
        }
        Ok(())
    }

    /// Render the JSON request body.
    ///
    /// `client_cache_key` is the effective key: the explicit one when set,
    /// otherwise whatever the export cache supplied.
    pub(crate) fn body_json(&self, client_cache_key: Option<&str>) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert(
            "format".to_string(),
            Value::String(self.format.wire_name().to_string()),
        );
        body.insert(
            "include_custom_fields".to_string(),
            Value::Bool(self.include_custom_fields),
        );
        body.insert("include_tags".to_string(), Value::Bool(self.include_tags));
        if !self.filters.is_empty() {
            body.insert(
                "filters".to_string(),
                Value::Object(self.filters.clone().into_iter().collect()),
            );
        }
        if !self.fields.is_empty() {
            body.insert(
                "fields".to_string(),
                Value::Array(self.fields.iter().cloned().map(Value::String).collect()),
            );
        }
        if self.force_refresh {
            body.insert("force_refresh".to_string(), Value::Bool(true));
        }
        if self.check_cache_only {
            body.insert("check_cache_only".to_string(), Value::Bool(true));
        }
        if let Some(key) = client_cache_key {
            body.insert(
                "client_cache_key".to_string(),
                Value::String(key.to_string()),
            );
        }
        Value::Object(body)
    }
}
