//! High-level bulk operations client.
//!
//! [`BulkClient`] owns the transport and orchestrates the full
//! submit/poll/result protocol: loads and deletes go up as multipart jobs,
//! exports resolve through the cache manager, dry runs come back as
//! validation results. The client is cheaply cloneable and safe to share
//! across tasks; concurrent calls share only the transport session and the
//! export cache map. Nothing is ever retried on the caller's behalf.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{
    self, CacheHitResponse, CacheStatus, ExportCache, ExportOutcome,
};
use crate::codec::{self, WireFormat};
use crate::config::{ClientConfig, PollOptions};
use crate::error::BulkError;
use crate::job::{poll, Job, SubmissionHandle};
use crate::request::{BulkRequest, DataSource, DeleteRequest, ExportRequest, LoadRequest};
use crate::table::{ModelInfo, ModelSchema};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, MultipartBuilder, Transport};
use crate::validate::ValidationResult;

/// Client for bulk operations against a record store.
///
/// # Example
///
/// ```no_run
/// use bulklift_rs::client::BulkClient;
/// use bulklift_rs::config::{ClientConfig, PollOptions};
/// use bulklift_rs::request::LoadRequest;
///
/// # async fn example() -> Result<(), bulklift_rs::error::BulkError> {
/// let client = BulkClient::new(ClientConfig::new(
///     "https://records.example.com",
///     "nbt_abc123",
/// ))?;
///
/// let job = client
///     .load(
///         &LoadRequest::from_file("dcim.site", "sites.jsonl.gz"),
///         &PollOptions::default(),
///     )
///     .await?;
/// println!("loaded {} rows", job.rows_affected().unwrap_or(0));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BulkClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    export_cache: Arc<ExportCache>,
}

impl BulkClient {
    /// Build a client with the HTTP transport.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the configuration is incomplete or the endpoint
    /// URL does not parse.
    pub fn new(config: ClientConfig) -> Result<Self, BulkError> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build a client over an explicit transport.
    ///
    /// This is the seam tests use to substitute an in-memory store.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let export_cache = Arc::new(ExportCache::new(config.cache_ttl));
        Self {
            transport,
            config,
            export_cache,
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Submit a bulk request without waiting for it.
    ///
    /// Load and delete requests are accepted. Export requests must go through
    /// [`export`](Self::export): a cache hit resolves without creating a job,
    /// so no submission handle can exist for them in general.
    pub async fn submit(&self, request: &BulkRequest) -> Result<SubmissionHandle, BulkError> {
        request.validate()?;
        match request {
            BulkRequest::Load(load) => self.submit_load_inner(load).await,
            BulkRequest::Delete(delete) => self.submit_delete_inner(delete).await,
            BulkRequest::Export(_) => Err(BulkError::InvalidRequest {
                message: "export requests resolve through export(); a cache hit creates no job"
                    .to_string(),
            }),
        }
    }

    /// Submit a load job and return its handle.
    ///
    /// A dry-run handle is a real job handle: it must still be polled to a
    /// terminal state before its result means anything.
    pub async fn submit_load(&self, request: &LoadRequest) -> Result<SubmissionHandle, BulkError> {
        request.validate()?;
        self.submit_load_inner(request).await
    }

    async fn submit_load_inner(&self, request: &LoadRequest) -> Result<SubmissionHandle, BulkError> {
        let (filename, payload) = self.prepare_payload(&request.source, request.format).await?;
        info!(
            model = %request.model,
            mode = %request.mode,
            dry_run = request.dry_run,
            bytes = payload.len(),
            "submitting load"
        );
        let mut builder = MultipartBuilder::new();
        for (name, value) in request.form_fields() {
            builder = builder.text(&name, &value);
        }
        let body = builder.file("file", &filename, &payload).finish();
        let response = self
            .transport
            .execute(ApiRequest::post_multipart("load/", body))
            .await?;
        self.parse_ack(response)
    }

    /// Submit a delete job and return its handle.
    pub async fn submit_delete(
        &self,
        request: &DeleteRequest,
    ) -> Result<SubmissionHandle, BulkError> {
        request.validate()?;
        self.submit_delete_inner(request).await
    }

    async fn submit_delete_inner(
        &self,
        request: &DeleteRequest,
    ) -> Result<SubmissionHandle, BulkError> {
        let (filename, payload) = self.prepare_payload(&request.source, request.format).await?;
        info!(
            model = %request.model,
            dry_run = request.dry_run,
            bytes = payload.len(),
            "submitting delete"
        );
        let mut builder = MultipartBuilder::new();
        for (name, value) in request.form_fields() {
            builder = builder.text(&name, &value);
        }
        let body = builder.file("file", &filename, &payload).finish();
        let response = self
            .transport
            .execute(ApiRequest::post_multipart("delete/", body))
            .await?;
        self.parse_ack(response)
    }

    /// Submit a load and wait for its terminal state.
    pub async fn load(
        &self,
        request: &LoadRequest,
        poll: &PollOptions,
    ) -> Result<Job, BulkError> {
        let handle = self.submit_load(request).await?;
        self.wait_for_job(&handle.job_id, poll).await
    }

    /// Submit a delete and wait for its terminal state.
    pub async fn delete(
        &self,
        request: &DeleteRequest,
        poll: &PollOptions,
    ) -> Result<Job, BulkError> {
        let handle = self.submit_delete(request).await?;
        self.wait_for_job(&handle.job_id, poll).await
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Run a load as a dry run and return the validation payload.
    ///
    /// The request's validation tier is honored as-is; only the dry-run flag
    /// is forced on. Nothing is committed regardless of tier.
    pub async fn validate(
        &self,
        request: &LoadRequest,
        poll: &PollOptions,
    ) -> Result<ValidationResult, BulkError> {
        let request = request.clone().dry_run(true);
        let job = self.load(&request, poll).await?;
        ValidationResult::from_job(&job)
    }

    /// Run a delete as a dry run and return the validation payload.
    pub async fn validate_delete(
        &self,
        request: &DeleteRequest,
        poll: &PollOptions,
    ) -> Result<ValidationResult, BulkError> {
        let request = request.clone().dry_run(true);
        let job = self.delete(&request, poll).await?;
        ValidationResult::from_job(&job)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Resolve an export through the cache.
    ///
    /// The flow per request flags:
    ///
    /// - `check_cache_only`: returns [`ExportOutcome::Status`]; never creates
    ///   a job.
    /// - `force_refresh`: always submits a fresh job and overwrites the
    ///   stored entry on completion.
    /// - otherwise: a stored entry's server key rides along as
    ///   `client_cache_key`; the server answers not-modified (no body),
    ///   hit (cached file), or miss (job submitted, polled to completion,
    ///   entry stored).
    pub async fn export(
        &self,
        request: &ExportRequest,
        poll: &PollOptions,
    ) -> Result<ExportOutcome, BulkError> {
        request.validate()?;
        let fingerprint = cache::selection_fingerprint(request);
        let client_key = request.client_cache_key.clone().or_else(|| {
            if request.force_refresh {
                None
            } else {
                self.export_cache
                    .lookup(&fingerprint)
                    .map(|entry| entry.cache_key)
            }
        });

        let body = request.body_json(client_key.as_deref());
        let response = self
            .transport
            .execute(ApiRequest::post_json("export/", body))
            .await?;

        match response.status {
            304 => {
                info!(model = %request.model, "export cache current; no body transferred");
                Ok(ExportOutcome::NotModified {
                    cache_key: client_key,
                })
            }
            200 if request.check_cache_only => {
                let status: CacheStatus = response.json()?;
                if status.data_changed {
                    self.export_cache.invalidate(&fingerprint);
                }
                debug!(
                    model = %request.model,
                    cached = status.cached,
                    data_changed = status.data_changed,
                    "export cache checked"
                );
                Ok(ExportOutcome::Status(status))
            }
            200 => {
                let hit: CacheHitResponse = response.json()?;
                if !hit.cached {
                    return Err(BulkError::TransportFailure {
                        message: "export returned 200 without a cached file".to_string(),
                    });
                }
                info!(
                    model = %request.model,
                    rows = hit.row_count.unwrap_or(0),
                    "export cache hit"
                );
                self.export_cache.store(&fingerprint, hit.to_entry());
                Ok(ExportOutcome::Completed(hit.into_result()))
            }
            202 => {
                let handle: SubmissionHandle = response.json()?;
                info!(
                    model = %request.model,
                    job_id = %handle.job_id,
                    force_refresh = request.force_refresh,
                    "export cache miss; job submitted"
                );
                let job = self.wait_for_job(&handle.job_id, poll).await?;
                let (result, entry) = cache::result_from_job(&job);
                self.export_cache.store(&fingerprint, entry);
                Ok(ExportOutcome::Completed(result))
            }
            status => Err(BulkError::from_response(status, &response.body)),
        }
    }

    /// Check cache status for a selection without creating a job.
    pub async fn check_export_cache(
        &self,
        request: &ExportRequest,
    ) -> Result<CacheStatus, BulkError> {
        let request = request.clone().check_cache_only(true);
        match self.export(&request, &PollOptions::default()).await? {
            ExportOutcome::Status(status) => Ok(status),
            ExportOutcome::NotModified { cache_key } => Ok(CacheStatus {
                cached: true,
                data_changed: false,
                cache_key,
            }),
            ExportOutcome::Completed(_) => Err(BulkError::TransportFailure {
                message: "server built an export for a check-only request".to_string(),
            }),
        }
    }

    /// Resolve an export and download the file.
    ///
    /// With no `output` path the file lands in the system temp directory
    /// under its locator's name. A not-modified outcome downloads nothing.
    pub async fn export_to_file(
        &self,
        request: &ExportRequest,
        output: Option<&Path>,
        poll: &PollOptions,
    ) -> Result<(ExportOutcome, Option<PathBuf>), BulkError> {
        let outcome = self.export(request, poll).await?;
        let path = match &outcome {
            ExportOutcome::Completed(result) => match result.download_url.as_deref() {
                Some(locator) => Some(self.download_export(locator, output).await?),
                None => None,
            },
            _ => None,
        };
        Ok((outcome, path))
    }

    /// Download an export file by its locator.
    pub async fn download_export(
        &self,
        locator: &str,
        output: Option<&Path>,
    ) -> Result<PathBuf, BulkError> {
        let response = self.transport.execute(ApiRequest::get(locator)).await?;
        if !response.is_success() {
            return Err(BulkError::from_response(response.status, &response.body));
        }
        let path = match output {
            Some(path) => path.to_path_buf(),
            None => {
                let name = locator
                    .rsplit('/')
                    .find(|segment| !segment.is_empty())
                    .unwrap_or("export");
                std::env::temp_dir().join(name)
            }
        };
        tokio::fs::write(&path, &response.body).await?;
        debug!(locator, path = %path.display(), bytes = response.body.len(), "export downloaded");
        Ok(path)
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Fetch a job's current status. Read-only and idempotent.
    pub async fn job_status(&self, job_id: &str) -> Result<Job, BulkError> {
        let response = self
            .transport
            .execute(ApiRequest::get(format!("jobs/{job_id}/")))
            .await?;
        if response.is_success() {
            response.json()
        } else {
            Err(BulkError::from_response(response.status, &response.body))
        }
    }

    /// Poll a job until it is terminal or the poll timeout elapses.
    ///
    /// Dropping the returned future cancels polling only; the remote job is
    /// unaffected.
    pub async fn wait_for_job(&self, job_id: &str, opts: &PollOptions) -> Result<Job, BulkError> {
        poll::poll_until_terminal(job_id, opts, || self.job_status(job_id)).await
    }

    // ========================================================================
    // Schema discovery
    // ========================================================================

    /// List the models available for bulk operations.
    pub async fn models(&self) -> Result<Vec<ModelInfo>, BulkError> {
        let response = self.transport.execute(ApiRequest::get("models/")).await?;
        if response.is_success() {
            response.json()
        } else {
            Err(BulkError::from_response(response.status, &response.body))
        }
    }

    /// Fetch the schema of one model.
    pub async fn model_schema(&self, model: &str) -> Result<ModelSchema, BulkError> {
        let response = self
            .transport
            .execute(ApiRequest::get(format!("models/{model}/")))
            .await?;
        if response.is_success() {
            response.json()
        } else {
            Err(BulkError::from_response(response.status, &response.body))
        }
    }

    /// Generate a template row for a model.
    ///
    /// See [`ModelSchema::template`] for the field rules.
    pub async fn template(
        &self,
        model: &str,
        include_optional: bool,
    ) -> Result<serde_json::Map<String, serde_json::Value>, BulkError> {
        let schema = self.model_schema(model).await?;
        Ok(schema.template(include_optional))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Resolve a data source into an upload filename and payload bytes.
    ///
    /// Tables are encoded — and files decode-checked — off the async runtime
    /// so a large local encode does not stall unrelated concurrent polls.
    /// Truncated or malformed files fail here as `CorruptData`, before any
    /// network call, instead of surfacing later as a failed job.
    async fn prepare_payload(
        &self,
        source: &DataSource,
        format: WireFormat,
    ) -> Result<(String, Vec<u8>), BulkError> {
        match source {
            DataSource::Table(table) => {
                let table = table.clone();
                let bytes = tokio::task::spawn_blocking(move || codec::encode(&table, format))
                    .await
                    .map_err(|e| BulkError::Io(std::io::Error::other(e)))??;
                Ok((format!("payload{}", format.extension()), bytes))
            }
            DataSource::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                let hint = path.clone();
                let bytes = tokio::task::spawn_blocking(move || {
                    codec::decode_with_hint(&bytes, Some(&hint)).map(|_| bytes)
                })
                .await
                .map_err(|e| BulkError::Io(std::io::Error::other(e)))??;
                let filename = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("payload")
                    .to_string();
                Ok((filename, bytes))
            }
        }
    }

    fn parse_ack(&self, response: ApiResponse) -> Result<SubmissionHandle, BulkError> {
        if response.is_success() {
            let handle: SubmissionHandle = response.json()?;
            debug!(job_id = %handle.job_id, status = %handle.status, "submission accepted");
            Ok(handle)
        } else {
            Err(BulkError::from_response(response.status, &response.body))
        }
    }
}
