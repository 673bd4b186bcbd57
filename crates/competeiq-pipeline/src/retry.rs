//! Retry with exponential back-off.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries
//! errors for which [`PipelineError::is_retryable`] holds. Everything else is
//! returned on the first failure.

use std::future::Future;
use std::time::Duration;

use crate::error::PipelineError;

const MAX_DELAY_MS: u64 = 60_000;

/// Attempt budget and delay schedule for one kind of call.
///
/// Delay before retry `n` (1-based) is `base_ms × 2ⁿ⁻¹`, capped at 60 s.
/// With `jitter` the delay is scaled by a random factor in `[0.75, 1.25)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_ms: u64,
    pub jitter: bool,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_ms: u64) -> Self {
        Self {
            max_retries,
            base_ms,
            jitter: false,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let capped = self.base_ms.saturating_mul(1u64 << exp).min(MAX_DELAY_MS);
        if !self.jitter || capped == 0 {
            return Duration::from_millis(capped);
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        Duration::from_millis(jittered)
    }
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// retryable errors. The last error is returned once the budget is spent.
///
/// # Errors
///
/// Returns the operation's error when it is not retryable or retries are
/// exhausted.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: BackoffPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient error, retrying after back-off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
