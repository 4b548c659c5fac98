//! Bounded retry with exponential, jittered backoff.

use std::future::Future;
use std::time::Duration;

use gatewarden_core::{AppError, AppResult};
use rand::Rng;
use tracing::warn;

/// Returns the delay before attempt `attempt` (1-based) of a retried
/// operation.
///
/// The curve is exponential, capped at `max`, with ±20% jitter so
/// synchronized callers fan out. The expected value is monotonically
/// non-decreasing in `attempt` and bounded by `max` plus jitter.
#[must_use]
pub fn jittered_backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let scaled = initial
        .as_millis()
        .saturating_mul(1_u128 << exponent)
        .min(max.as_millis());
    let base = u64::try_from(scaled).unwrap_or(u64::MAX);
    let jitter_span = base / 5;
    let jittered = base
        .saturating_sub(jitter_span)
        .saturating_add(rand::thread_rng().gen_range(0..=jitter_span.saturating_mul(2)));

    Duration::from_millis(jittered)
}

/// Bounded retry policy for evaluation-engine calls.
///
/// Each attempt runs under a per-call timeout; timeouts and retryable
/// errors are retried up to `max_attempts`, then surfaced as
/// [`AppError::StoreUnavailable`]. Client errors are never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay_ms: u64,
    /// Upper bound on the backoff delay.
    pub max_delay_ms: u64,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            timeout_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Runs `attempt_fn` under this policy.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error: Option<AppError> = None;

        for attempt in 1..=max_attempts {
            let outcome = tokio::time::timeout(
                Duration::from_millis(self.timeout_ms),
                attempt_fn(),
            )
            .await;

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) if error.is_retryable() => error,
                Ok(Err(error)) => return Err(error),
                Err(_) => AppError::StoreUnavailable(format!(
                    "{operation} timed out after {}ms",
                    self.timeout_ms
                )),
            };

            warn!(
                operation,
                attempt,
                max_attempts,
                error = %error,
                "retryable operation attempt failed"
            );
            last_error = Some(error);

            if attempt < max_attempts {
                let delay = jittered_backoff(
                    Duration::from_millis(self.initial_delay_ms),
                    Duration::from_millis(self.max_delay_ms),
                    attempt,
                );
                tokio::time::sleep(delay).await;
            }
        }

        let detail = last_error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "no attempt recorded".to_owned());
        Err(AppError::StoreUnavailable(format!(
            "{operation} failed after {max_attempts} attempts: {detail}"
        )))
    }
}
