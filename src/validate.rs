//! Validation tiers and dry-run results.
//!
//! Validation depth and dry-run are independent axes: the tier picks how much
//! checking the server performs, dry-run decides whether anything commits.
//! Both travel on every load/delete request and are honored together, so a
//! full-tier dry run checks everything and changes nothing.

use serde::{Deserialize, Serialize};

use crate::error::{BulkError, RemoteErrorKind};
use crate::job::Job;

/// How much validation the server applies to a load or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationTier {
    /// Destination-store constraints only.
    None,
    /// Constraints plus targeted domain legality checks.
    #[default]
    Auto,
    /// Exhaustive field-level validation.
    Full,
}

impl ValidationTier {
    /// Wire label of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationTier::None => "none",
            ValidationTier::Auto => "auto",
            ValidationTier::Full => "full",
        }
    }
}

impl std::fmt::Display for ValidationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Machine-readable failure code, when the issue maps to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<RemoteErrorKind>,
    /// Human-readable description.
    pub message: String,
    /// Offending column, when column-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Offending value, rendered as text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Remediation hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Zero-based row index of the offending record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
}

/// Outcome of a dry run.
///
/// Error and warning order is the server's row order and is preserved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether every row passed the selected tier.
    pub valid: bool,
    /// Number of rows examined.
    #[serde(default)]
    pub rows: u64,
    /// Problems that would block the real run.
    #[serde(default)]
    pub errors: Vec<ValidationIssue>,
    /// Problems that would not block the real run.
    #[serde(default)]
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Extract the validation payload from a terminal dry-run job.
    ///
    /// # Errors
    ///
    /// `TransportFailure` when the job carries no parseable validation
    /// payload, which would mean the server broke the dry-run contract.
    pub(crate) fn from_job(job: &Job) -> Result<Self, BulkError> {
        let data = job.data.as_ref().ok_or_else(|| BulkError::TransportFailure {
            message: format!("dry-run job {} completed without a result payload", job.job_id),
        })?;
        serde_json::from_value(data.clone()).map_err(|e| BulkError::TransportFailure {
            message: format!("dry-run job {} has malformed validation payload: {e}", job.job_id),
        })
    }
}
