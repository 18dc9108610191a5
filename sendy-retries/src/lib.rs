//! # sendy-retries
//!
//! Retry policy and backoff for sendy.
//!
//! Retries only ever apply to transport failures: connection errors and
//! attempts that timed out before a response arrived. A response that was
//! received is handed back to the caller as-is, whatever its status.
//!
//! ## Core Concepts
//!
//! - **[`RetryPolicy`]**: decides per failed attempt whether to retry, and
//!   how long to wait
//! - **[`ExponentialBackoff`]**: exponential envelope with full jitter
//! - **[`Transient`]**: classifies errors as worth retrying
//! - **[`with_retry`]**: runs an async operation under a policy
//!
//! ## Example
//!
//! ```ignore
//! use sendy_retries::{with_retry, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(12));
//!
//! let response = with_retry(&policy, || async {
//!     client.get("https://example.com").send().await
//! }).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod executor;
pub mod policy;
pub mod transient;

// Re-exports
pub use backoff::ExponentialBackoff;
pub use executor::{with_retry, with_retry_state, AttemptInfo, RetryState};
pub use policy::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_PER_ATTEMPT_TIMEOUT};
pub use transient::Transient;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{with_retry, ExponentialBackoff, RetryPolicy, Transient};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let policy = RetryPolicy::default().max_retries(5);
        assert_eq!(policy.max_retries, 5);
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(policy.per_attempt_timeout, Some(DEFAULT_PER_ATTEMPT_TIMEOUT));
    }

    #[test]
    fn test_backoff_is_bounded_by_per_attempt_timeout() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        assert_eq!(policy.backoff.max, Duration::from_secs(5));
    }
}
