//! Bounded retry with exponential backoff and jitter.
//!
//! Applies to every outbound platform call. Only transient failures
//! (timeouts, 5xx, 429) retry; 4xx responses other than 429 and
//! not-found outcomes fail immediately. A 429 Retry-After hint overrides
//! the computed backoff.

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

use lading_core::error::{Result, SyncError};

/// Retry policy for outbound platform calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (so 3 means two retries).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Randomization around each delay, 0.0 to 1.0.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (1-based).
    ///
    /// A server-supplied Retry-After wins over the computed backoff.
    pub fn delay_after(&self, attempt: u32, error: &SyncError) -> Duration {
        if let Some(seconds) = error.retry_after_seconds() {
            return Duration::from_secs(seconds).min(self.max_delay);
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(2_u32.saturating_pow(exponent));
        apply_jitter(backoff.min(self.max_delay), self.jitter_factor).min(self.max_delay)
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }
    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.random_range(-range..=range);
    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}

/// Runs `op` under the policy, retrying transient failures.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt, &error);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy { jitter_factor: 0.0, ..RetryPolicy::default() }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            jitter_factor: 0.0,
            max_attempts: 5,
        };
        let err = SyncError::transient("upstream", "timeout");
        assert_eq!(policy.delay_after(1, &err), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2, &err), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3, &err), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4, &err), Duration::from_secs(4));
    }

    #[test]
    fn retry_after_hint_wins() {
        let policy = no_jitter();
        let err = SyncError::Transient {
            target: "downstream",
            message: "rate limited".into(),
            status: Some(429),
            retry_after_seconds: Some(7),
        };
        assert_eq!(policy.delay_after(1, &err), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn transient_errors_retry_to_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };

        let result = with_retry(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SyncError::transient("upstream", "blip"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::permanent("upstream", 400, "bad request")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        let result: Result<()> = with_retry(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::transient("upstream", "down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
