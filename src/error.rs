//! Error taxonomy and failure classification.
//!
//! Every terminal failure a bulk operation can produce maps to exactly one
//! [`BulkError`] variant. Remote failures arrive as a structured payload with a
//! machine-readable `error_type` code; classification decodes that code as a
//! typed enum and never inspects human-readable message text. Dry-run and real
//! runs share the same taxonomy so caller branching logic works for both.
//!
//! The core never retries on the caller's behalf. [`BulkError::is_retryable`]
//! marks the failures a caller may safely resubmit (transport-level only);
//! constraint, permission, and schema failures surface immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable failure codes reported by the remote store.
///
/// Decoded straight from the wire `error_type` field. An unrecognized code
/// fails deserialization and is surfaced as a transport-level failure rather
/// than being silently folded into a weaker category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Referenced parent object does not exist.
    ForeignKey,
    /// Duplicate row under the active conflict specification.
    Unique,
    /// NULL in a non-nullable column.
    NotNull,
    /// Row rejected by a check constraint or domain rule.
    Check,
    /// Value cannot be coerced to the column's wire type.
    DataType,
    /// Value exceeds the column's maximum length.
    StringTooLong,
    /// Column set does not match the target model schema.
    Schema,
    /// Token is valid but lacks permission for the operation.
    Permission,
    /// Requested isolation branch does not exist.
    BranchNotFound,
    /// Requested isolation branch exists but is not ready for writes.
    BranchNotReady,
    /// Uploaded payload exceeds the server's size limit.
    PayloadTooLarge,
    /// Server could not parse the uploaded payload.
    CorruptData,
}

/// Structured error payload attached to failed jobs and 4xx responses.
///
/// Shape: `{error_type, message, column?, value?, suggestion?, row?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorPayload {
    /// Machine-readable failure code.
    pub error_type: RemoteErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Offending column, when the failure is column-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Offending value, rendered as text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Remediation hint from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Zero-based row index of the offending record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
}

/// Structured context carried by remote-detected failures.
///
/// Holds the full server payload so automated remediation has the offending
/// column, value, and suggestion available without re-querying the job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorDetail {
    /// Human-readable description.
    pub message: String,
    /// Offending column, when column-scoped.
    pub column: Option<String>,
    /// Offending value, rendered as text.
    pub value: Option<String>,
    /// Remediation hint from the server.
    pub suggestion: Option<String>,
    /// Zero-based row index of the offending record, when known.
    pub row: Option<u64>,
}

impl ErrorDetail {
    /// Build a detail from a bare message with no column context.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl From<RemoteErrorPayload> for ErrorDetail {
    fn from(payload: RemoteErrorPayload) -> Self {
        Self {
            message: payload.message,
            column: payload.column,
            value: payload.value,
            suggestion: payload.suggestion,
            row: payload.row,
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(column) = &self.column {
            write!(f, " (column: {column}")?;
            if let Some(value) = &self.value {
                write!(f, ", value: {value}")?;
            }
            write!(f, ")")?;
        } else if let Some(value) = &self.value {
            write!(f, " (value: {value})")?;
        }
        if let Some(row) = self.row {
            write!(f, " [row {row}]")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, " - {suggestion}")?;
        }
        Ok(())
    }
}

/// Errors produced by bulk operations.
///
/// The first fifteen variants form the remote/terminal taxonomy; `InvalidRequest`
/// and `Io` cover purely local concerns (request construction rules and local
/// file access) and never originate from the remote store.
#[derive(Error, Debug)]
pub enum BulkError {
    /// Referenced parent object does not exist.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(ErrorDetail),

    /// Duplicate row under the active conflict specification.
    #[error("unique violation: {0}")]
    UniqueViolation(ErrorDetail),

    /// NULL in a non-nullable column.
    #[error("not-null violation: {0}")]
    NotNullViolation(ErrorDetail),

    /// Row rejected by a check constraint or domain rule.
    #[error("check violation: {0}")]
    CheckViolation(ErrorDetail),

    /// Value cannot be coerced to the column's wire type.
    #[error("data type mismatch: {0}")]
    DataTypeMismatch(ErrorDetail),

    /// Value exceeds the column's maximum length.
    #[error("string too long: {0}")]
    StringTooLong(ErrorDetail),

    /// A column was rejected against the target model schema.
    #[error("schema mismatch on column '{column}': {message}")]
    SchemaMismatch {
        /// The rejected column.
        column: String,
        /// What was wrong with it.
        message: String,
    },

    /// Token is valid but lacks permission for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(ErrorDetail),

    /// Requested isolation branch does not exist.
    #[error("isolation target not found: {0}")]
    IsolationTargetNotFound(ErrorDetail),

    /// Requested isolation branch exists but is not ready for writes.
    #[error("isolation target not ready: {0}")]
    IsolationTargetNotReady(ErrorDetail),

    /// Uploaded payload exceeds the server's size limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(ErrorDetail),

    /// Input bytes are truncated or malformed. Raised locally before any
    /// network call when decoding fails, or remotely when the server cannot
    /// parse an upload.
    #[error("corrupt data: {message}")]
    CorruptData {
        /// What failed to parse.
        message: String,
    },

    /// The caller's poll timeout elapsed before the job reached a terminal
    /// state. Distinct from job failure: the job keeps running remotely and
    /// its identifier remains queryable.
    #[error("job {job_id} still not terminal after {waited:?}")]
    JobTimeout {
        /// Identifier of the still-running job.
        job_id: String,
        /// How long the poller waited.
        waited: Duration,
    },

    /// Token missing, malformed, or rejected.
    #[error("authentication failure: {message}")]
    AuthenticationFailure {
        /// Server or transport explanation.
        message: String,
    },

    /// Connection, TLS, protocol, or server-side (5xx) failure. The only
    /// category a caller may safely retry.
    #[error("transport failure: {message}")]
    TransportFailure {
        /// What went wrong on the wire.
        message: String,
    },

    /// A request violated a construction rule before anything was sent.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// The violated rule.
        message: String,
    },

    /// Local file access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BulkError {
    /// Whether the caller may safely resubmit the operation.
    ///
    /// Only transport failures qualify: the request may never have reached the
    /// store. Everything else either definitely executed server-side or will
    /// deterministically fail again, and retrying a non-idempotent mutation
    /// after an ambiguous constraint failure could double-apply it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BulkError::TransportFailure { .. })
    }

    /// Structured server context, when this failure carries one.
    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            BulkError::ForeignKeyViolation(d)
            | BulkError::UniqueViolation(d)
            | BulkError::NotNullViolation(d)
            | BulkError::CheckViolation(d)
            | BulkError::DataTypeMismatch(d)
            | BulkError::StringTooLong(d)
            | BulkError::PermissionDenied(d)
            | BulkError::IsolationTargetNotFound(d)
            | BulkError::IsolationTargetNotReady(d)
            | BulkError::PayloadTooLarge(d) => Some(d),
            _ => None,
        }
    }

    /// Classify a structured remote error payload.
    ///
    /// Pure code-to-variant mapping; the message text is carried through
    /// untouched and never consulted.
    pub(crate) fn from_remote(payload: RemoteErrorPayload) -> Self {
        let kind = payload.error_type;
        let detail = ErrorDetail::from(payload);
        match kind {
            RemoteErrorKind::ForeignKey => BulkError::ForeignKeyViolation(detail),
            RemoteErrorKind::Unique => BulkError::UniqueViolation(detail),
            RemoteErrorKind::NotNull => BulkError::NotNullViolation(detail),
            RemoteErrorKind::Check => BulkError::CheckViolation(detail),
            RemoteErrorKind::DataType => BulkError::DataTypeMismatch(detail),
            RemoteErrorKind::StringTooLong => BulkError::StringTooLong(detail),
            RemoteErrorKind::Schema => BulkError::SchemaMismatch {
                column: detail.column.unwrap_or_default(),
                message: detail.message,
            },
            RemoteErrorKind::Permission => BulkError::PermissionDenied(detail),
            RemoteErrorKind::BranchNotFound => BulkError::IsolationTargetNotFound(detail),
            RemoteErrorKind::BranchNotReady => BulkError::IsolationTargetNotReady(detail),
            RemoteErrorKind::PayloadTooLarge => BulkError::PayloadTooLarge(detail),
            RemoteErrorKind::CorruptData => BulkError::CorruptData {
                message: detail.message,
            },
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// Status classes that carry their own meaning (401, 403, 413, 5xx) map
    /// directly; anything else with a parseable error payload goes through
    /// [`BulkError::from_remote`]. A body that fails to parse is a protocol
    /// violation and reports as a transport failure rather than being guessed
    /// into a stronger category.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        let payload = serde_json::from_slice::<RemoteErrorPayload>(body).ok();
        match status {
            401 => BulkError::AuthenticationFailure {
                message: payload
                    .map(|p| p.message)
                    .unwrap_or_else(|| "authentication rejected".to_string()),
            },
            403 => BulkError::PermissionDenied(
                payload
                    .map(ErrorDetail::from)
                    .unwrap_or_else(|| ErrorDetail::from_message("permission denied")),
            ),
            413 => BulkError::PayloadTooLarge(
                payload
                    .map(ErrorDetail::from)
                    .unwrap_or_else(|| ErrorDetail::from_message("payload too large")),
            ),
            s if s >= 500 => BulkError::TransportFailure {
                message: format!("server error (HTTP {s})"),
            },
            s => match payload {
                Some(p) => BulkError::from_remote(p),
                None => BulkError::TransportFailure {
                    message: format!(
                        "HTTP {s} with unrecognized error body: {}",
                        String::from_utf8_lossy(&body[..body.len().min(256)])
                    ),
                },
            },
        }
    }
}
