//! Typed bulk requests.
//!
//! Every operation is a tagged request type with an exhaustively enumerated
//! field set, checked before anything touches the wire. The builders default
//! every knob the way the server does, so the minimal construction is one
//! line and every deviation is explicit in the caller's code.

pub mod delete;
pub mod export;
pub mod load;

pub use delete::DeleteRequest;
pub use export::ExportRequest;
pub use load::{LoadMode, LoadRequest};

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::BulkError;
use crate::job::OperationKind;
use crate::table::Table;

/// Payload of a load or delete: an in-memory table encoded on submit, or an
/// already-encoded file on disk.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// Encode this table at submission time.
    Table(Table),
    /// Upload this file as-is; the wire format is inferred from its name.
    File(PathBuf),
}

/// How an upsert detects rows that already exist.
///
/// Exactly one mechanism is ever active; the variants make a second one
/// unrepresentable. When a builder is given both a field set and a named
/// constraint, the constraint wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConflictSpec {
    /// Match on the model's primary key.
    #[default]
    PrimaryKey,
    /// Match on an explicit field set.
    Fields(Vec<String>),
    /// Match via a named constraint on the model.
    Constraint(String),
}

/// Per-request override of the server's event dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventDispatch {
    /// Use the server's global configuration.
    #[default]
    Inherit,
    /// Dispatch events for this request regardless of configuration.
    Force,
    /// Skip events for this request regardless of configuration.
    Suppress,
}

impl EventDispatch {
    /// Wire value, `None` when the global configuration applies.
    pub(crate) fn form_value(&self) -> Option<&'static str> {
        match self {
            EventDispatch::Inherit => None,
            EventDispatch::Force => Some("true"),
            EventDispatch::Suppress => Some("false"),
        }
    }
}

/// Post-operation hooks to enable or disable for one request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostHooks {
    hooks: BTreeMap<String, bool>,
}

impl PostHooks {
    /// No overrides: the server runs its configured hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a hook to run after the operation.
    pub fn enable(mut self, name: impl Into<String>) -> Self {
        self.hooks.insert(name.into(), true);
        self
    }

    /// Prevent a hook from running after the operation.
    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.hooks.insert(name.into(), false);
        self
    }

    /// Whether any override is set.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// JSON object rendering for the request body.
    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(&self.hooks).expect("hook map serializes")
    }
}

/// A bulk operation, tagged by kind.
///
/// Load and delete submit through [`BulkClient::submit`]; export goes through
/// [`BulkClient::export`] because a cache hit resolves without creating a job
/// at all.
///
/// [`BulkClient::submit`]: crate::client::BulkClient::submit
/// [`BulkClient::export`]: crate::client::BulkClient::export
#[derive(Debug, Clone)]
pub enum BulkRequest {
    /// Insert or upsert rows.
    Load(LoadRequest),
    /// Delete rows by key.
    Delete(DeleteRequest),
    /// Export a selection.
    Export(ExportRequest),
}

impl BulkRequest {
    /// Operation kind of this request.
    pub fn kind(&self) -> OperationKind {
        match self {
            BulkRequest::Load(_) => OperationKind::Load,
            BulkRequest::Delete(_) => OperationKind::Delete,
            BulkRequest::Export(_) => OperationKind::Export,
        }
    }

    /// Target model identifier.
    pub fn model(&self) -> &str {
        match self {
            BulkRequest::Load(r) => &r.model,
            BulkRequest::Delete(r) => &r.model,
            BulkRequest::Export(r) => &r.model,
        }
    }

    /// Check construction rules before submission.
    pub fn validate(&self) -> Result<(), BulkError> {
        match self {
            BulkRequest::Load(r) => r.validate(),
            BulkRequest::Delete(r) => r.validate(),
            BulkRequest::Export(r) => r.validate(),
        }
    }
}
