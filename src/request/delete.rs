//! Delete request builder.

use std::path::PathBuf;

use crate::codec::WireFormat;
use crate::error::BulkError;
use crate::request::{DataSource, EventDispatch};
use crate::table::Table;

/// A bulk delete request.
///
/// The payload is a key table: one column per key field, one row per object
/// to delete. With no explicit key fields the model's primary key applies.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    /// Target model identifier.
    pub model: String,
    /// Keys of the rows to delete.
    pub source: DataSource,
    /// Key field names; `None` means the primary key.
    pub key_fields: Option<Vec<String>>,
    /// Clear nullable foreign-key references to the deleted rows first.
    pub cascade_nullable_fks: bool,
    /// Whether the server records per-object change log entries.
    pub create_changelogs: bool,
    /// Event dispatch override.
    pub dispatch_events: EventDispatch,
    /// Isolation branch target.
    pub branch: Option<String>,
    /// Validate and count without deleting.
    pub dry_run: bool,
    /// Wire format used when `source` is an in-memory table.
    pub format: WireFormat,
}

impl DeleteRequest {
    /// Delete rows keyed by an in-memory table.
    pub fn from_table(model: impl Into<String>, keys: Table) -> Self {
        Self::new(model, DataSource::Table(keys))
    }

    /// Delete rows keyed by an already-encoded file.
    pub fn from_file(model: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(model, DataSource::File(path.into()))
    }

    fn new(model: impl Into<String>, source: DataSource) -> Self {
        Self {
            model: model.into(),
            source,
            key_fields: None,
            cascade_nullable_fks: true,
            create_changelogs: true,
            dispatch_events: EventDispatch::default(),
            branch: None,
            dry_run: false,
            format: WireFormat::default(),
        }
    }

    /// Match rows on these fields instead of the primary key.
    pub fn key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable clearing nullable FK references first.
    pub fn cascade_nullable_fks(mut self, cascade: bool) -> Self {
        self.cascade_nullable_fks = cascade;
        self
    }

    /// Enable or disable per-object change log entries.
    pub fn create_changelogs(mut self, create: bool) -> Self {
        self.create_changelogs = create;
        self
    }

    /// Override event dispatch.
    pub fn dispatch_events(mut self, dispatch: EventDispatch) -> Self {
        self.dispatch_events = dispatch;
        self
    }

    /// Target an isolation branch.
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Validate and count without deleting.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the wire format for in-memory tables.
    pub fn wire_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Check construction rules.
    pub fn validate(&self) -> Result<(), BulkError> {
        if self.model.is_empty() {
            return Err(BulkError::InvalidRequest {
                message: "model identifier is required".to_string(),
            });
        }
        if let Some(fields) = &self.key_fields {
            if fields.is_empty() {
                return Err(BulkError::InvalidRequest {
                    message: "key field set must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Render the multipart form fields for submission.
    pub(crate) fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("model".to_string(), self.model.clone()),
            (
                "cascade_nullable_fks".to_string(),
                self.cascade_nullable_fks.to_string(),
            ),
            (
                "create_changelogs".to_string(),
                self.create_changelogs.to_string(),
            ),
        ];
        if let Some(keys) = &self.key_fields {
            fields.push(("key_fields".to_string(), keys.join(",")));
        }
        if let Some(value) = self.dispatch_events.form_value() {
            fields.push(("dispatch_events".to_string(), value.to_string()));
        }
        if let Some(branch) = &self.branch {
            fields.push(("branch".to_string(), branch.clone()));
        }
        if self.dry_run {
            fields.push(("dry_run".to_string(), "true".to_string()));
        }
        fields
    }
}
