//! Job model: server-tracked asynchronous units of bulk work.
//!
//! A job's lifecycle is monotonic: `pending` → `running` → one of
//! `completed`/`errored`, and terminal states are final from the client's
//! perspective. The client only ever reads job state; there is no
//! remote-cancel primitive.

pub mod poll;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of bulk operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Insert or upsert rows.
    Load,
    /// Delete rows by key.
    Delete,
    /// Export a selection.
    Export,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OperationKind::Load => "load",
            OperationKind::Delete => "delete",
            OperationKind::Export => "export",
        };
        f.write_str(label)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet started.
    Pending,
    /// Executing.
    Running,
    /// Finished successfully; the result payload is final.
    Completed,
    /// Finished unsuccessfully; the error payload is final.
    Errored,
}

impl JobStatus {
    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Errored)
    }

    /// Position in the monotonic lifecycle, for regression detection.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Errored => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Errored => "errored",
        };
        f.write_str(label)
    }
}

/// Acknowledgment returned by a submission endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    /// Identifier of the accepted job.
    pub job_id: String,
    /// Status at acceptance time (normally `pending`).
    pub status: JobStatus,
    /// Polling URL, when the server supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
    /// Informational message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether this job is a dry run. Dry-run jobs are asynchronous like any
    /// other and must still be polled to a terminal state.
    #[serde(default)]
    pub dry_run: bool,
}

/// A job status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub job_id: String,
    /// Operation kind, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationKind>,
    /// Target model identifier, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// When the job was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// When execution began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    /// Result payload; final once the job completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error payload; final once the job errors. Kept raw here and decoded
    /// during classification so an unrecognized payload is still observable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Wall-clock duration, when terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Download locator for export jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl Job {
    /// A field of the result payload.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref()?.get(key)
    }

    /// Rows affected by a load or delete, when reported.
    pub fn rows_affected(&self) -> Option<u64> {
        self.data_field("rows_affected").and_then(Value::as_u64)
    }

    /// Download locator of an export job: the top-level field when present,
    /// else the result payload's.
    pub fn export_download_url(&self) -> Option<&str> {
        self.download_url
            .as_deref()
            .or_else(|| self.data_field("download_url").and_then(Value::as_str))
            .or_else(|| self.data_field("file_url").and_then(Value::as_str))
    }
}
