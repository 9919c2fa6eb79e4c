//! Transport seam between the client and the record store.
//!
//! [`Transport`] is the one integration point with the wire: it executes a
//! single request/response exchange and reports transport-level failures
//! only — non-success HTTP statuses come back as ordinary responses for the
//! caller to classify. The production implementation is
//! [`HttpTransport`](http::HttpTransport); tests substitute an in-memory
//! fake behind the same trait.
//!
//! The trait object is shareable across concurrent calls; implementations
//! hold no per-request mutable state.

pub mod http;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::BulkError;

pub use http::HttpTransport;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read-only fetch.
    Get,
    /// Submission.
    Post,
}

impl Method {
    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an outbound request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// `application/json`.
    Json(serde_json::Value),
    /// `multipart/form-data` with fields and an uploaded file.
    Multipart(MultipartBody),
}

impl RequestBody {
    /// `Content-Type` header value.
    pub fn content_type(&self) -> String {
        match self {
            RequestBody::Json(_) => "application/json".to_string(),
            RequestBody::Multipart(body) => {
                format!("multipart/form-data; boundary={}", body.boundary())
            }
        }
    }

    /// Serialized body bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Json(value) => value.to_string().into_bytes(),
            RequestBody::Multipart(body) => body.as_bytes().to_vec(),
        }
    }
}

/// One outbound API request.
///
/// `path` is relative to the API base (e.g. `load/`, `jobs/{id}/`) unless it
/// starts with `/`, in which case it is taken from the server root — download
/// locators arrive in that form.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Relative or server-rooted path.
    pub path: String,
    /// Body for POST requests.
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    /// A GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// A POST request with a JSON body.
    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(RequestBody::Json(body)),
        }
    }

    /// A POST request with a multipart body.
    pub fn post_multipart(path: impl Into<String>, body: MultipartBody) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(RequestBody::Multipart(body)),
        }
    }
}

/// One inbound API response.
///
/// Any status can appear here; classification of non-success statuses is the
/// caller's job, not the transport's.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// `TransportFailure` when the body is not valid JSON of the expected
    /// shape — a broken protocol, not a data problem.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BulkError> {
        serde_json::from_slice(&self.body).map_err(|e| BulkError::TransportFailure {
            message: format!("malformed response body: {e}"),
        })
    }
}

/// Executes one authenticated request/response exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request.
    ///
    /// # Errors
    ///
    /// `TransportFailure` (or `AuthenticationFailure` for TLS identity
    /// problems) on connection-level errors only; HTTP error statuses are
    /// returned as responses.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, BulkError>;
}

/// A rendered `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    data: Vec<u8>,
}

impl MultipartBody {
    /// Boundary string, without leading dashes.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Rendered body bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builder for `multipart/form-data` bodies.
pub struct MultipartBuilder {
    boundary: String,
    data: Vec<u8>,
}

impl MultipartBuilder {
    /// Start a body with a process-unique boundary.
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
            .unwrap_or(0);
        let count = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            boundary: format!("----bulklift-{nanos:016x}-{count:08x}"),
            data: Vec::new(),
        }
    }

    fn open_part(&mut self) {
        self.data.extend_from_slice(b"--");
        self.data.extend_from_slice(self.boundary.as_bytes());
        self.data.extend_from_slice(b"\r\n");
    }

    /// Append a text form field.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part();
        self.data.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.data.extend_from_slice(value.as_bytes());
        self.data.extend_from_slice(b"\r\n");
        self
    }

    /// Append a file field.
    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.open_part();
        self.data.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.data.extend_from_slice(content);
        self.data.extend_from_slice(b"\r\n");
        self
    }

    /// Close the body.
    pub fn finish(mut self) -> MultipartBody {
        self.data.extend_from_slice(b"--");
        self.data.extend_from_slice(self.boundary.as_bytes());
        self.data.extend_from_slice(b"--\r\n");
        MultipartBody {
            boundary: self.boundary,
            data: self.data,
        }
    }
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self::new()
    }
}
