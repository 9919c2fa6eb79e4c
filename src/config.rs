//! Client configuration.
//!
//! Connection settings are an explicit value constructed once and handed to
//! [`BulkClient::new`](crate::client::BulkClient::new). There is no ambient
//! environment lookup and no process-wide session state; credential loading
//! belongs to the caller.

use std::time::Duration;

use crate::error::BulkError;

/// Default overall poll timeout (one hour, matching server-side job retention).
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default first poll interval.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);

/// Default backoff ceiling for poll intervals.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Connection settings for a [`BulkClient`](crate::client::BulkClient).
///
/// # Example
///
/// ```
/// use bulklift_rs::config::ClientConfig;
///
/// let config = ClientConfig::new("https://records.example.com", "nbt_abc123")
///     .verify_tls(false)
///     .connect_timeout(std::time::Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the record store, without a trailing slash.
    pub endpoint: String,
    /// Bearer token presented on every request.
    pub token: String,
    /// Whether to validate the server certificate on TLS connections.
    pub verify_tls: bool,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Client-side TTL for export cache entries. `None` means entries stay
    /// valid until the server reports a data change or a force refresh
    /// replaces them.
    pub cache_ttl: Option<Duration>,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a configuration for the given endpoint and token.
    ///
    /// A trailing slash on the endpoint is stripped.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.into(),
            verify_tls: true,
            connect_timeout: Duration::from_secs(30),
            cache_ttl: None,
            user_agent: concat!("bulklift-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Enable or disable TLS certificate validation.
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set a client-side TTL for export cache entries.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Override the `User-Agent` header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Check that the configuration is usable.
    pub(crate) fn validate(&self) -> Result<(), BulkError> {
        if self.endpoint.is_empty() {
            return Err(BulkError::InvalidRequest {
                message: "endpoint URL is required".to_string(),
            });
        }
        if self.token.is_empty() {
            return Err(BulkError::InvalidRequest {
                message: "API token is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Polling behavior for waiting on a job's terminal state.
///
/// The interval starts at `initial_interval` and doubles after each poll up to
/// `max_interval`. When `timeout` elapses before the job is terminal, the wait
/// ends with [`BulkError::JobTimeout`](crate::error::BulkError::JobTimeout);
/// the remote job keeps running and stays queryable.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Interval before the first and between early polls.
    pub initial_interval: Duration,
    /// Backoff ceiling.
    pub max_interval: Duration,
    /// Overall limit on the wait.
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollOptions {
    /// Set the initial poll interval.
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the backoff ceiling.
    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the overall timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
