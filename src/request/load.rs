//! Load (insert/upsert) request builder.

use std::path::PathBuf;

use crate::codec::WireFormat;
use crate::error::BulkError;
use crate::request::{ConflictSpec, DataSource, EventDispatch, PostHooks};
use crate::table::Table;
use crate::validate::ValidationTier;

/// Whether a load creates rows only or also updates existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Every row must be new.
    #[default]
    Insert,
    /// Existing rows (per the conflict specification) are updated in place.
    Upsert,
}

impl LoadMode {
    /// Wire label of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Insert => "insert",
            LoadMode::Upsert => "upsert",
        }
    }
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk load request.
///
/// # Example
///
/// ```
/// use bulklift_rs::request::{LoadMode, LoadRequest};
/// use bulklift_rs::table::{Column, Table};
///
/// let sites = Table::new()
///     .with_column("name", Column::Text(vec![Some("fra1".into())]))
///     .unwrap()
///     .with_column("slug", Column::Text(vec![Some("fra1".into())]))
///     .unwrap();
///
/// let request = LoadRequest::from_table("dcim.site", sites)
///     .mode(LoadMode::Upsert)
///     .conflict_fields(["slug"])
///     .dry_run(true);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Target model identifier.
    pub model: String,
    /// Rows to load.
    pub source: DataSource,
    /// Insert or upsert.
    pub mode: LoadMode,
    /// Validation depth.
    pub validation: ValidationTier,
    /// Validate without committing.
    pub dry_run: bool,
    /// Post-operation hook overrides.
    pub post_hooks: PostHooks,
    /// Whether the server records per-object change log entries.
    pub create_changelogs: bool,
    /// Event dispatch override.
    pub dispatch_events: EventDispatch,
    /// Isolation branch target, when the operation should not touch the
    /// primary data store.
    pub branch: Option<String>,
    /// Wire format used when `source` is an in-memory table.
    pub format: WireFormat,

    conflict_fields: Option<Vec<String>>,
    conflict_constraint: Option<String>,
}

impl LoadRequest {
    /// Load an in-memory table.
    pub fn from_table(model: impl Into<String>, table: Table) -> Self {
        Self::new(model, DataSource::Table(table))
    }

    /// Load an already-encoded file.
    pub fn from_file(model: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(model, DataSource::File(path.into()))
    }

    fn new(model: impl Into<String>, source: DataSource) -> Self {
        Self {
            model: model.into(),
            source,
            mode: LoadMode::default(),
            validation: ValidationTier::default(),
            dry_run: false,
            post_hooks: PostHooks::new(),
            create_changelogs: true,
            dispatch_events: EventDispatch::default(),
            branch: None,
            format: WireFormat::default(),
            conflict_fields: None,
            conflict_constraint: None,
        }
    }

    /// Set the load mode.
    pub fn mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Detect upsert conflicts on an explicit field set.
    pub fn conflict_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflict_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Detect upsert conflicts via a named constraint. Overrides
    /// [`conflict_fields`](Self::conflict_fields) when both are set.
    pub fn conflict_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.conflict_constraint = Some(constraint.into());
        self
    }

    /// Set the validation tier.
    pub fn validation(mut self, tier: ValidationTier) -> Self {
        self.validation = tier;
        self
    }

    /// Validate without committing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override post-operation hooks.
    pub fn post_hooks(mut self, hooks: PostHooks) -> Self {
        self.post_hooks = hooks;
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

    /// Set the wire format for in-memory tables.
    pub fn wire_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// The active conflict specification.
    ///
    /// A named constraint overrides a field set; with neither set, the
    /// primary key applies.
    pub fn conflict_spec(&self) -> ConflictSpec {
        if let Some(constraint) = &self.conflict_constraint {
            ConflictSpec::Constraint(constraint.clone())
        } else if let Some(fields) = &self.conflict_fields {
            ConflictSpec::Fields(fields.clone())
        } else {
            ConflictSpec::PrimaryKey
        }
    }

    /// Check construction rules.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the model is empty, a conflict specification is
    /// supplied for a plain insert, an explicit field set is empty, or a
    /// named constraint is blank.
    pub fn validate(&self) -> Result<(), BulkError> {
        if self.model.is_empty() {
            return Err(BulkError::InvalidRequest {
                message: "model identifier is required".to_string(),
            });
        }
        if self.mode == LoadMode::Insert
            && (self.conflict_fields.is_some() || self.conflict_constraint.is_some())
        {
            return Err(BulkError::InvalidRequest {
                message: "conflict specification only applies to upsert mode".to_string(),
            });
        }
        if let Some(fields) = &self.conflict_fields {
            if fields.is_empty() {
                return Err(BulkError::InvalidRequest {
                    message: "conflict field set must not be empty".to_string(),
                });
            }
        }
        if let Some(constraint) = &self.conflict_constraint {
            if constraint.is_empty() {
                return Err(BulkError::InvalidRequest {
                    message: "conflict constraint name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Render the multipart form fields for submission.
    pub(crate) fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("model".to_string(), self.model.clone()),
            ("mode".to_string(), self.mode.as_str().to_string()),
            (
                "validation_mode".to_string(),
                self.validation.as_str().to_string(),
            ),
            (
                "create_changelogs".to_string(),
                self.create_changelogs.to_string(),
            ),
        ];
        match self.conflict_spec() {
            ConflictSpec::PrimaryKey => {}
            ConflictSpec::Fields(names) => {
                fields.push(("conflict_fields".to_string(), names.join(",")));
            }
            ConflictSpec::Constraint(name) => {
                fields.push(("conflict_constraint".to_string(), name));
            }
        }
        if !self.post_hooks.is_empty() {
            fields.push(("post_hooks".to_string(), self.post_hooks.to_json()));
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
