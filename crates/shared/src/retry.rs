//! Retry helpers with exponential backoff and jitter.

use crate::{ErrorCategory, ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const RATE_LIMIT_ONLY: &[ErrorCategory] = &[ErrorCategory::TransientRateLimited];
const RATE_LIMIT_OR_SERVER: &[ErrorCategory] = &[
    ErrorCategory::TransientRateLimited,
    ErrorCategory::TransientServer,
];

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier applied after every retry.
    pub multiplier: u32,
    /// Maximum delay cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Jitter ratio as percentage (0..=100).
    pub jitter_ratio_pct: u32,
    /// Categories this policy is willing to retry.
    pub eligible: &'static [ErrorCategory],
}

impl RetryPolicy {
    /// Default maximum attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    /// Default initial backoff.
    pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
    /// Default multiplier.
    pub const DEFAULT_MULTIPLIER: u32 = 2;
    /// Default backoff cap.
    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;
    /// Default jitter percentage.
    pub const DEFAULT_JITTER_RATIO_PCT: u32 = 10;

    /// Policy that retries only rate-limited responses.
    ///
    /// Used for almost every call: reads, creates and patches.
    #[must_use]
    pub const fn rate_limit_only() -> Self {
        Self::with_eligible(RATE_LIMIT_ONLY)
    }

    /// Policy that retries rate-limited responses and transient server errors.
    ///
    /// Used for destructive calls, where a dropped connection is common.
    #[must_use]
    pub const fn rate_limit_or_server_error() -> Self {
        Self::with_eligible(RATE_LIMIT_OR_SERVER)
    }

    /// Default timings with a caller-chosen eligibility set.
    #[must_use]
    pub const fn with_eligible(eligible: &'static [ErrorCategory]) -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: Self::DEFAULT_INITIAL_BACKOFF_MS,
            multiplier: Self::DEFAULT_MULTIPLIER,
            max_backoff_ms: Self::DEFAULT_MAX_BACKOFF_MS,
            jitter_ratio_pct: Self::DEFAULT_JITTER_RATIO_PCT,
            eligible,
        }
    }

    /// Return the same timings with another eligibility set.
    #[must_use]
    pub const fn eligible_for(self, eligible: &'static [ErrorCategory]) -> Self {
        Self { eligible, ..self }
    }

    /// Returns true when `category` may be retried under this policy.
    #[must_use]
    pub fn is_eligible(&self, category: ErrorCategory) -> bool {
        self.eligible.contains(&category)
    }

    /// Convert jitter ratio to a unit interval (0.0..=1.0).
    #[must_use]
    pub fn jitter_ratio(self) -> f64 {
        f64::from(self.jitter_ratio_pct) / 100.0
    }

    /// Delay scheduled after the given failed attempt (1-based), without jitter.
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_backoff_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(u64::from(self.multiplier.max(1)));
            if delay >= self.max_backoff_ms {
                break;
            }
        }
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::rate_limit_only()
    }
}

/// Retry a fallible async operation with backoff + jitter.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(ctx, policy, operation, &mut op, |attempt, delay, error| {
        tracing::debug!(
            operation,
            correlation_id = %ctx.correlation_id(),
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            category = %error.category,
            code = %error.code,
            "retrying after failure"
        );
    })
    .await
}

/// Retry with a callback invoked before each scheduled retry.
///
/// The observer receives the failed attempt number, the delay that is about to
/// be slept and the failure that triggered the retry.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, Duration, &ErrorEnvelope),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !policy.is_eligible(error.category) {
                    return Err(error);
                }
                if attempt >= max_attempts {
                    return Err(exhausted_error(error, attempt, operation));
                }

                let delay = backoff_delay(policy, attempt);
                on_retry(attempt, delay, &error);
                sleep_with_cancellation(ctx, delay, operation).await?;
            },
        }
    }
}

fn exhausted_error(error: ErrorEnvelope, attempts: u32, operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope {
        message: format!("gave up after {attempts} attempts: {}", error.message),
        ..error
    }
    .with_metadata("attempts", attempts.to_string())
    .with_metadata("operation", operation)
}

fn backoff_delay(policy: RetryPolicy, attempt: u32) -> Duration {
    let nominal = policy.nominal_delay(attempt);
    let capped = u64::try_from(nominal.as_millis()).unwrap_or(u64::MAX);
    let jitter_pct = u64::from(policy.jitter_ratio_pct.min(100));
    if jitter_pct == 0 {
        return nominal;
    }
    let jitter_range = (capped.saturating_mul(jitter_pct)) / 100;
    let seed = jitter_seed(attempt);
    let unit = i64::from(u32::try_from(seed % 1000).unwrap_or(0));
    let signed = unit - 500;
    let jitter_range_i64 = i64::try_from(jitter_range).unwrap_or(i64::MAX);
    let capped_i64 = i64::try_from(capped).unwrap_or(i64::MAX);
    let offset = jitter_range_i64.saturating_mul(signed) / 500;
    let max_i64 = i64::try_from(policy.max_backoff_ms).unwrap_or(i64::MAX);
    let jittered = capped_i64.saturating_add(offset).clamp(0, max_i64);
    Duration::from_millis(u64::try_from(jittered).unwrap_or(0))
}

fn jitter_seed(attempt: u32) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::from(duration.subsec_nanos()));
    nanos ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(operation)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}
