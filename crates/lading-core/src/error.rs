//! Error taxonomy for the synchronization pipeline.
//!
//! Errors are classified by what the caller should do next: validation
//! failures are skipped and reported, transient failures are retried up to
//! a bounded cap, permanent failures are skipped or escalated, and
//! stream-level failures abort the cycle without touching the checkpoint.

use thiserror::Error;

/// Result type alias using `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type shared across the pipeline crates.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Order is structurally unprocessable. Skip and report; never retried.
    #[error("order {order_id} failed validation: {reason}")]
    Validation {
        /// Upstream order id, or a placeholder when even that is missing.
        order_id: String,
        /// Human-readable description of the first failure.
        reason: String,
    },

    /// Timeout, 5xx, or 429. Retry with backoff up to the configured cap,
    /// then report as failed for this cycle.
    #[error("transient failure talking to {target}: {message}")]
    Transient {
        /// Which platform the call went to.
        target: &'static str,
        /// Description of the failure.
        message: String,
        /// HTTP status, when the failure was an HTTP response.
        status: Option<u16>,
        /// Server-requested delay before retrying, from Retry-After.
        retry_after_seconds: Option<u64>,
    },

    /// A specific order no longer exists upstream. The item is skipped and
    /// reported as missing; the checkpoint may advance past it.
    #[error("order {order_id} not found upstream")]
    OrderNotFound {
        /// The order that was deleted before it could be fetched.
        order_id: String,
    },

    /// The event stream itself has been deleted or rotated upstream.
    /// Terminal: polling must stop until an operator re-initializes the
    /// checkpoint.
    #[error("event stream {stream_id} not found; checkpoint requires re-initialization")]
    StreamNotFound {
        /// The stream whose position token is no longer valid.
        stream_id: String,
    },

    /// Non-retryable upstream or downstream response (4xx other than 429).
    #[error("permanent failure talking to {target} (HTTP {status}): {message}")]
    Permanent {
        /// Which platform the call went to.
        target: &'static str,
        /// HTTP status code.
        status: u16,
        /// Description of the failure.
        message: String,
    },

    /// Checkpoint compare-and-swap lost against a concurrent writer.
    /// Concurrent consumers on one stream are a configuration error.
    #[error("checkpoint conflict for stream {stream_id}: expected version {expected}, found {found}")]
    CheckpointConflict {
        /// Stream whose checkpoint was contended.
        stream_id: String,
        /// Version this writer expected.
        expected: u64,
        /// Version actually stored.
        found: u64,
    },

    /// Checkpoint storage failed for a reason other than contention.
    #[error("checkpoint storage failure: {0}")]
    CheckpointStorage(String),

    /// Inbound shipment confirmation with no discoverable upstream order
    /// id. Reported for manual handling; never retried blindly.
    #[error("shipment {shipment_id} cannot be reconciled: {reason}")]
    Unresolvable {
        /// The downstream shipment the webhook referred to.
        shipment_id: String,
        /// Why no upstream order id could be resolved.
        reason: String,
    },
}

impl SyncError {
    /// Builds a transient error for the named platform.
    pub fn transient(target: &'static str, message: impl Into<String>) -> Self {
        Self::Transient { target, message: message.into(), status: None, retry_after_seconds: None }
    }

    /// Builds a permanent error for the named platform.
    pub fn permanent(target: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Permanent { target, status, message: message.into() }
    }

    /// Whether a bounded retry is worthwhile.
    ///
    /// Only transient failures retry; everything else either skips the
    /// item or escalates.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error ends polling for the stream until an operator
    /// intervenes.
    pub const fn is_terminal_for_stream(&self) -> bool {
        matches!(self, Self::StreamNotFound { .. })
    }

    /// Retry-After hint carried by a transient response, if any.
    pub const fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Transient { retry_after_seconds, .. } => *retry_after_seconds,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(SyncError::transient("upstream", "timeout").is_retryable());
        assert!(!SyncError::permanent("upstream", 400, "bad request").is_retryable());
        assert!(!SyncError::OrderNotFound { order_id: "R1".into() }.is_retryable());
        assert!(!SyncError::StreamNotFound { stream_id: "s1".into() }.is_retryable());
        assert!(!SyncError::Validation { order_id: "R1".into(), reason: "no address".into() }
            .is_retryable());
    }

    #[test]
    fn stream_not_found_is_terminal() {
        assert!(SyncError::StreamNotFound { stream_id: "s1".into() }.is_terminal_for_stream());
        assert!(!SyncError::transient("upstream", "timeout").is_terminal_for_stream());
    }
}
