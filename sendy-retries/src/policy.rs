//! Retry policy for deciding what to retry and when.

use crate::backoff::ExponentialBackoff;
use crate::transient::Transient;
use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default time allowed for a single attempt.
pub const DEFAULT_PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(12);

/// Policy deciding, per failed attempt, whether to retry and how long to wait.
///
/// The policy is a pure function of the attempt number and the error, so one
/// value can be shared by every request built from the same client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Time allowed for a single attempt, if any.
    pub per_attempt_timeout: Option<Duration>,
    /// Delay strategy between attempts.
    pub backoff: ExponentialBackoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_PER_ATTEMPT_TIMEOUT)
    }
}

impl RetryPolicy {
    /// Retry up to `max_retries` times, bounding every attempt and every
    /// backoff envelope by `per_attempt_timeout`.
    pub fn new(max_retries: u32, per_attempt_timeout: Duration) -> Self {
        Self {
            max_retries,
            per_attempt_timeout: Some(per_attempt_timeout),
            backoff: ExponentialBackoff::new(Duration::from_secs(1), per_attempt_timeout),
        }
    }

    /// A policy that never retries and sets no per-attempt timeout.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            per_attempt_timeout: None,
            backoff: ExponentialBackoff::default(),
        }
    }

    /// Set max retries.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Override the base delay of the backoff envelope.
    #[must_use]
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.backoff = self.backoff.base(base);
        self
    }

    /// Replace the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Worst-case duration of a retried exchange: `max_retries` times the
    /// per-attempt timeout. `None` when that product is zero or unbounded.
    pub fn overall_timeout(&self) -> Option<Duration> {
        self.per_attempt_timeout
            .and_then(|t| t.checked_mul(self.max_retries))
            .filter(|t| !t.is_zero())
    }

    /// Check if the failed attempt numbered `attempt` (0-indexed) should be
    /// retried.
    pub fn should_retry<E: Transient + ?Sized>(&self, attempt: u32, error: &E) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Decide whether to retry and, if so, how long to wait first.
    pub fn decide<E: Transient + ?Sized>(&self, attempt: u32, error: &E) -> Option<Duration> {
        self.should_retry(attempt, error)
            .then(|| self.backoff.calculate_delay(attempt))
    }
}
