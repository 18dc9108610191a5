//! Backoff strategies.

use std::time::Duration;

/// Exponential backoff with full jitter.
///
/// Retry `n` (0-indexed) waits a random duration in `[0, envelope(n))`, where
/// the envelope is `base * 2^n` capped at `max`. Randomizing over the whole
/// envelope keeps clients that failed together from retrying together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay envelope of the first retry.
    pub base: Duration,
    /// Upper bound of any envelope.
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(12),
        }
    }
}

impl ExponentialBackoff {
    /// Create a new exponential backoff.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Set the base delay.
    #[must_use]
    pub fn base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// The largest delay retry `attempt` may wait.
    pub fn envelope(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(62) as i32);
        let envelope = self.base.as_secs_f64() * factor;
        Duration::try_from_secs_f64(envelope.min(self.max.as_secs_f64()))
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Calculate a jittered delay for retry `attempt`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.envelope(attempt).mul_f64(random_unit())
    }
}

/// Uniform sample in `[0.0, 1.0)`.
fn random_unit() -> f64 {
    use rand::Rng;
    rand::thread_rng().gen::<f64>()
}
