//! Export cache management.
//!
//! An export's cache identity is the fingerprint of its selection (model,
//! filters, fields, custom-field/tag switches, format). The server pairs that
//! selection with an opaque data-version indicator and answers hit, miss, or
//! not-modified; this side only consumes that contract and never assumes how
//! invalidation works remotely.
//!
//! The client keeps one [`CacheEntry`] per selection fingerprint, recording
//! the server cache key of the last export it saw. That key rides along on
//! the next request as `client_cache_key`, which is what turns an unchanged
//! re-export into a bodyless not-modified answer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::job::Job;
use crate::request::ExportRequest;

/// A remembered export result for one selection.
///
/// Created when an export job completes (or a server-side hit is observed);
/// replaced by force-refresh; dropped when the server reports the selection's
/// data changed or the client-side TTL lapses. Otherwise read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Server cache key (embeds the remote data-version indicator).
    pub cache_key: String,
    /// When the server built the export.
    pub created_at: Option<DateTime<Utc>>,
    /// Rows in the exported file.
    pub row_count: Option<u64>,
    /// Size of the exported file.
    pub file_size_bytes: Option<u64>,
    /// Where to download the file.
    pub download_url: Option<String>,
}

/// Cache-status report from a `check_cache_only` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Whether a valid cached export exists for the selection.
    pub cached: bool,
    /// Whether the selection's data changed since the last export.
    #[serde(default)]
    pub data_changed: bool,
    /// Server cache key of the valid entry, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

/// Uniform result of a resolved export, cached or fresh.
///
/// Hit and miss-then-complete results differ only in the `cached` marker and
/// timestamps, so downstream consumers handle both identically.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Whether the file came from the server cache.
    pub cached: bool,
    /// Server cache key of the export.
    pub cache_key: Option<String>,
    /// When the server built the export.
    pub created_at: Option<DateTime<Utc>>,
    /// Where to download the file.
    pub download_url: Option<String>,
    /// Size of the exported file.
    pub file_size_bytes: Option<u64>,
    /// Rows in the exported file.
    pub row_count: Option<u64>,
    /// The job that built the file, for fresh exports.
    pub job_id: Option<String>,
}

/// Outcome of an export call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// A file is available, cached or freshly built.
    Completed(ExportResult),
    /// The caller's copy is current; no body was transferred.
    NotModified {
        /// Server cache key the caller's copy matches.
        cache_key: Option<String>,
    },
    /// Cache status only (`check_cache_only`); no job was created.
    Status(CacheStatus),
}

/// Server response body for a cache hit (HTTP 200).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CacheHitResponse {
    pub cached: bool,
    #[serde(default)]
    pub cache_key: Option<String>,
    #[serde(default)]
    pub cache_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file_size_bytes: Option<u64>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

impl CacheHitResponse {
    pub(crate) fn into_result(self) -> ExportResult {
        ExportResult {
            cached: true,
            cache_key: self.cache_key,
            created_at: self.cache_created_at,
            download_url: self.download_url,
            file_size_bytes: self.file_size_bytes,
            row_count: self.row_count,
            job_id: None,
        }
    }

    pub(crate) fn to_entry(&self) -> CacheEntry {
        CacheEntry {
            cache_key: self.cache_key.clone().unwrap_or_default(),
            created_at: self.cache_created_at,
            row_count: self.row_count,
            file_size_bytes: self.file_size_bytes,
            download_url: self.download_url.clone(),
        }
    }
}

/// Build an [`ExportResult`] and [`CacheEntry`] from a completed export job.
pub(crate) fn result_from_job(job: &Job) -> (ExportResult, CacheEntry) {
    let field_str = |key: &str| {
        job.data_field(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };
    let field_u64 = |key: &str| job.data_field(key).and_then(serde_json::Value::as_u64);

    let cache_key = field_str("cache_key");
    let created_at = job
        .data_field("cache_created_at")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
        .or(job.completed);
    let download_url = job.export_download_url().map(str::to_string);
    let file_size_bytes = field_u64("file_size_bytes");
    let row_count = field_u64("row_count");

    let result = ExportResult {
        cached: false,
        cache_key: cache_key.clone(),
        created_at,
        download_url: download_url.clone(),
        file_size_bytes,
        row_count,
        job_id: Some(job.job_id.clone()),
    };
    let entry = CacheEntry {
        cache_key: cache_key.unwrap_or_default(),
        created_at,
        row_count,
        file_size_bytes,
        download_url,
    };
    (result, entry)
}

/// Deterministic fingerprint of an export selection.
///
/// Covers exactly the parameters that define what is exported — model,
/// filters, fields, custom-field/tag switches, format — and none of the
/// cache-control flags, so a force refresh lands on the same key it
/// overwrites. Filters are canonically ordered before hashing.
pub fn selection_fingerprint(request: &ExportRequest) -> String {
    let canonical = serde_json::json!({
        "model": request.model,
        "filters": request.filters,
        "fields": request.fields,
        "include_custom_fields": request.include_custom_fields,
        "include_tags": request.include_tags,
        "format": request.format.wire_name(),
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

struct StoredEntry {
    entry: CacheEntry,
    stored_at: Instant,
}

/// Client-side map of selection fingerprints to cache entries.
pub(crate) struct ExportCache {
    entries: Mutex<HashMap<String, StoredEntry>>,
    ttl: Option<Duration>,
}

impl ExportCache {
    pub(crate) fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// The stored entry for a fingerprint, dropping it when the TTL lapsed.
    pub(crate) fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().expect("export cache lock");
        if let Some(ttl) = self.ttl {
            if let Some(stored) = entries.get(fingerprint) {
                if stored.stored_at.elapsed() >= ttl {
                    debug!(fingerprint, "export cache entry expired");
                    entries.remove(fingerprint);
                    return None;
                }
            }
        }
        entries.get(fingerprint).map(|s| s.entry.clone())
    }

    pub(crate) fn store(&self, fingerprint: &str, entry: CacheEntry) {
        debug!(fingerprint, cache_key = %entry.cache_key, "export cache entry stored");
        self.entries.lock().expect("export cache lock").insert(
            fingerprint.to_string(),
            StoredEntry {
                entry,
                stored_at: Instant::now(),
            },
        );
    }

    pub(crate) fn invalidate(&self, fingerprint: &str) {
        if self
            .entries
            .lock()
            .expect("export cache lock")
            .remove(fingerprint)
            .is_some()
        {
            debug!(fingerprint, "export cache entry invalidated");
        }
    }
}
