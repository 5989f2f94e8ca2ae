//! Retry logic with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::SourceError;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is `multiplier * 2^attempt`, clamped to `[min, max]`.
    Exponential {
        multiplier: Duration,
        min: Duration,
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the clamped delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            multiplier: Duration::from_secs(1),
            min: Duration::from_secs(2),
            max: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Calculate the delay after a failed attempt.
    ///
    /// * `attempt` - The retry attempt number (0-based)
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                multiplier,
                min,
                max,
                jitter,
            } => {
                let scale = 2_f64.powi(attempt.min(30) as i32);
                let seconds = multiplier.as_secs_f64() * scale;
                let clamped = seconds.clamp(min.as_secs_f64(), max.as_secs_f64().max(min.as_secs_f64()));

                let mut delay = Duration::from_secs_f64(clamped);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms = delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Configuration for the automatic retry wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Enables or disables retries. Disabled policies still make one attempt.
    pub enabled: bool,
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// The backoff strategy to use between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Exponential policy with the default backoff curve.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Fixed-delay policy.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Attempts this policy will make, never less than one.
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts the policy. The last error is returned unchanged.
///
/// ```rust,ignore
/// let table = retry(&policy, "vci.history", || provider.history(request.clone())).await?;
/// ```
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempts = attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !error.retryable() {
                    debug!(operation, error = %error, "non-retryable error, giving up");
                    return Err(error);
                }
                if attempt >= attempts {
                    warn!(operation, error = %error, attempts, "retries exhausted");
                    return Err(error);
                }

                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(
                    operation,
                    error = %error,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
