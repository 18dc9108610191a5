//! Runs an async operation under a [`RetryPolicy`], sleeping between attempts.

use crate::policy::RetryPolicy;
use crate::transient::Transient;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// State of a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Number of attempts made (1-indexed).
    pub attempt: u32,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total time spent waiting.
    pub total_wait_time: Duration,
    /// History of attempts.
    pub history: Vec<AttemptInfo>,
}

/// Outcome of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptInfo {
    /// Attempt number.
    pub attempt: u32,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Time waited after this attempt.
    pub wait_time: Duration,
}

/// Execute an operation, retrying transient failures as the policy allows.
///
/// # Example
///
/// ```ignore
/// use sendy_retries::{with_retry, RetryPolicy};
///
/// let policy = RetryPolicy::default();
/// let response = with_retry(&policy, || client.execute(request.try_clone().unwrap())).await?;
/// ```
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    with_retry_state(policy, operation).await.0
}

/// Like [`with_retry`], also returning the per-attempt history.
pub async fn with_retry_state<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: F,
) -> (Result<T, E>, RetryState)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut state = RetryState::default();

    loop {
        state.attempt += 1;

        debug!(
            attempt = state.attempt,
            max_retries = policy.max_retries,
            "Executing attempt"
        );

        match operation().await {
            Ok(result) => {
                state.history.push(AttemptInfo {
                    attempt: state.attempt,
                    success: true,
                    error: None,
                    wait_time: Duration::ZERO,
                });
                return (Ok(result), state);
            }
            Err(error) => {
                let Some(wait) = policy.decide(state.attempt - 1, &error) else {
                    warn!(
                        attempt = state.attempt,
                        error = %error,
                        "Retries exhausted or error not retryable"
                    );
                    state.history.push(AttemptInfo {
                        attempt: state.attempt,
                        success: false,
                        error: Some(error.to_string()),
                        wait_time: Duration::ZERO,
                    });
                    state.last_error = Some(error.to_string());
                    return (Err(error), state);
                };

                state.total_wait_time += wait;
                state.last_error = Some(error.to_string());
                state.history.push(AttemptInfo {
                    attempt: state.attempt,
                    success: false,
                    error: Some(error.to_string()),
                    wait_time: wait,
                });

                debug!(
                    attempt = state.attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %error,
                    "Waiting before retry"
                );

                sleep(wait).await;
            }
        }
    }
}
