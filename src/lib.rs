//! # bulklift-rs
//!
//! Async client for bulk data operations against a record store's
//! background-job API.
//!
//! The store executes bulk work asynchronously: a submission is acknowledged
//! with a job handle, the job runs remotely, and the client polls it to a
//! terminal state. This crate orchestrates that protocol end to end:
//!
//! - **Submission**: typed load / delete / export requests, validated before
//!   anything touches the wire
//! - **Codec**: lossless round-trips between in-memory tables and two wire
//!   encodings (row-delimited JSON, optionally gzipped; Parquet columnar)
//! - **Polling**: bounded-backoff status polling with local-only
//!   cancellation and a distinct timeout outcome
//! - **Export caching**: hit / miss / not-modified resolution keyed on the
//!   export selection
//! - **Validation**: three-tier dry runs that share the real run's error
//!   taxonomy
//!
//! Mutations are at-most-once: nothing is ever retried automatically, and
//! load/delete jobs apply all rows or none.
//!
//! ## Load Example
//!
//! ```no_run
//! use bulklift_rs::*;
//!
//! # async fn example() -> Result<(), BulkError> {
//! let client = BulkClient::new(ClientConfig::new(
//!     "https://records.example.com",
//!     "nbt_abc123",
//! ))?;
//!
//! let sites = Table::new()
//!     .with_column("name", Column::Text(vec![Some("fra1".into())]))?
//!     .with_column("slug", Column::Text(vec![Some("fra1".into())]))?;
//!
//! let job = client
//!     .load(
//!         &LoadRequest::from_table("dcim.site", sites),
//!         &PollOptions::default(),
//!     )
//!     .await?;
//! println!("loaded {} rows", job.rows_affected().unwrap_or(0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Upsert Example
//!
//! ```no_run
//! use bulklift_rs::*;
//!
//! # async fn example(client: &BulkClient, devices: Table) -> Result<(), BulkError> {
//! let request = LoadRequest::from_table("dcim.device", devices)
//!     .mode(LoadMode::Upsert)
//!     .conflict_fields(["name", "site_id"]);
//! client.load(&request, &PollOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cached Export Example
//!
//! ```no_run
//! use bulklift_rs::*;
//!
//! # async fn example(client: &BulkClient) -> Result<(), BulkError> {
//! let request = ExportRequest::new("dcim.device").filter("site_id", 1);
//! match client.export(&request, &PollOptions::default()).await? {
//!     ExportOutcome::Completed(result) if result.cached => {
//!         println!("cache hit: {} rows", result.row_count.unwrap_or(0));
//!     }
//!     ExportOutcome::Completed(result) => {
//!         println!("fresh export: {} rows", result.row_count.unwrap_or(0));
//!     }
//!     ExportOutcome::NotModified { .. } => println!("local copy is current"),
//!     ExportOutcome::Status(_) => unreachable!("not a check-only request"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Dry-Run Validation Example
//!
//! ```no_run
//! use bulklift_rs::*;
//!
//! # async fn example(client: &BulkClient, rows: Table) -> Result<(), BulkError> {
//! let request = LoadRequest::from_table("dcim.device", rows)
//!     .validation(ValidationTier::Full);
//! let result = client.validate(&request, &PollOptions::default()).await?;
//! for issue in &result.errors {
//!     eprintln!("row {:?}: {}", issue.row, issue.message);
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod job;
pub mod request;
pub mod table;
pub mod transport;
pub mod validate;

// =============================================================================
// Client
// =============================================================================

/// Re-export the client and its configuration.
pub use client::BulkClient;
pub use config::{ClientConfig, PollOptions};

// =============================================================================
// Error Types
// =============================================================================

/// Re-export error types for convenient error handling.
pub use error::{BulkError, ErrorDetail, RemoteErrorKind, RemoteErrorPayload};

// =============================================================================
// Tables and Schemas
// =============================================================================

/// Re-export the in-memory table model.
pub use table::{Column, ColumnType, FieldSchema, ModelInfo, ModelSchema, Table};

// =============================================================================
// Codec
// =============================================================================

/// Re-export the format codec surface.
pub use codec::{decode, decode_as, decode_with_hint, encode, WireFormat};

// =============================================================================
// Requests
// =============================================================================

/// Re-export the typed request builders.
pub use request::{
    BulkRequest, ConflictSpec, DataSource, DeleteRequest, EventDispatch, ExportRequest, LoadMode,
    LoadRequest, PostHooks,
};

// =============================================================================
// Jobs
// =============================================================================

/// Re-export the job model.
pub use job::{Job, JobStatus, OperationKind, SubmissionHandle};

// =============================================================================
// Export Caching
// =============================================================================

/// Re-export export cache types.
pub use cache::{selection_fingerprint, CacheEntry, CacheStatus, ExportOutcome, ExportResult};

// =============================================================================
// Validation
// =============================================================================

/// Re-export validation types.
pub use validate::{ValidationIssue, ValidationResult, ValidationTier};
