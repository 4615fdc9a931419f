//! Exponential backoff for transient failures.
//!
//! [`RetryPolicy`] serves two callers:
//!
//! - the outbox worker, which persists `next_attempt_at` between attempts so
//!   a retry schedule survives restarts
//! - [`retry_with_predicate`], for short in-request retries (the synchronous
//!   credit-back after a failed checkout)
//!
//! # Example
//!
//! ```rust
//! use matchday_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(8)
//!     .initial_delay(Duration::from_secs(1))
//!     .max_delay(Duration::from_secs(300))
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
//! assert!(policy.is_exhausted(8));
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule.
///
/// # Default Values
///
/// - `max_attempts`: 10
/// - `initial_delay`: 1 second
/// - `max_delay`: 10 minutes
/// - `multiplier`: 2.0 (delay doubles each attempt)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts (including the first) before giving up
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Cap for the exponential delay
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Delay to wait after `failures` failed attempts (0-based).
    ///
    /// `initial_delay * multiplier ^ failures`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = failures.min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64)
    }

    /// When the next attempt may run, given `failures` so far (including the
    /// one that just happened).
    #[must_use]
    pub fn next_attempt_at(&self, now: DateTime<Utc>, failures: u32) -> DateTime<Utc> {
        let delay = self.delay_for_attempt(failures.saturating_sub(1));
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(now)
    }

    /// Whether `attempts` failures have used up the budget.
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set the attempt budget.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the delay after the first failure.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(10).max(1),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_secs(1)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(600)),
            multiplier: self.multiplier.unwrap_or(2.0),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts, sleeping between attempts.
///
/// # Errors
///
/// Returns the last error once the budget is spent, or the first error
/// `is_retryable` rejects.
///
/// # Example
///
/// ```rust
/// use matchday_runtime::retry::{RetryPolicy, retry_with_predicate};
///
/// # async fn example() -> Result<(), String> {
/// let value = retry_with_predicate(
///     &RetryPolicy::default(),
///     || async { Ok::<_, String>(42) },
///     |err: &String| err.contains("transient"),
/// )
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut failures = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if failures > 0 {
                    tracing::info!(failures, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::warn!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                failures += 1;
                if policy.is_exhausted(failures) {
                    tracing::error!(failures, error = %err, "Operation failed after max attempts");
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(failures - 1);
                tracing::warn!(
                    failures,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
