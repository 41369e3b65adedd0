//! Shared HTTP plumbing: client construction and error classification.

use std::time::Duration;

use lading_core::error::SyncError;

/// Configuration shared by both platform clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Platform base URL, without a trailing slash.
    pub base_url: String,
    /// API key sent on every request.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: crate::retry::RetryPolicy,
}

impl ClientConfig {
    /// Creates a config with the default timeout and retry policy.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
            retry: crate::retry::RetryPolicy::default(),
        }
    }
}

/// Builds a pooled reqwest client with the configured timeout.
pub(crate) fn build_client(
    config: &ClientConfig,
    target: &'static str,
) -> Result<reqwest::Client, SyncError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("lading/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::permanent(target, 0, format!("failed to build HTTP client: {e}")))
}

/// Maps a transport-level reqwest error. Timeouts and connection failures
/// are transient; everything else at this layer is too (the request never
/// produced a response to classify).
pub(crate) fn transport_error(target: &'static str, error: &reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::transient(target, "request timeout")
    } else if error.is_connect() {
        SyncError::transient(target, format!("connection failed: {error}"))
    } else {
        SyncError::transient(target, error.to_string())
    }
}

/// Classifies a non-success HTTP response.
///
/// 429 and 5xx are transient; other 4xx are permanent. Callers handle 404
/// themselves first where it has a specific meaning (missing order,
/// rotated stream, empty lookup).
pub(crate) fn status_error(target: &'static str, response: &reqwest::Response) -> SyncError {
    let status = response.status();
    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return SyncError::Transient {
            target,
            message: "rate limited".to_string(),
            status: Some(429),
            retry_after_seconds: retry_after,
        };
    }
    if status.is_server_error() {
        return SyncError::Transient {
            target,
            message: format!("server error: HTTP {}", status.as_u16()),
            status: Some(status.as_u16()),
            retry_after_seconds: None,
        };
    }
    SyncError::permanent(target, status.as_u16(), format!("HTTP {}", status.as_u16()))
}
