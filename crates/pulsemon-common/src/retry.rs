//! Bounded retry with a fixed delay ladder.
//!
//! [`retry`] runs an async operation and, while the classifier says the
//! failure is worth another try, sleeps the next delay from the ladder and
//! runs it again. With `k` delays the operation runs at most `k + 1` times.
//! The ladder is not exponential: the caller supplies every step.

use std::future::Future;
use std::time::Duration;

/// Delay ladder used by both the agent and the server.
pub const DEFAULT_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Failure returned by [`retry`].
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The classifier rejected the error, so it was returned without retrying.
    #[error(transparent)]
    Permanent(E),

    /// Every delay was spent and the last attempt still failed.
    #[error("max attempts exceeded after {attempts} attempts: {source}")]
    MaxAttemptsExceeded {
        attempts: usize,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::MaxAttemptsExceeded { .. })
    }

    /// Returns the last underlying error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::MaxAttemptsExceeded { source, .. } => source,
        }
    }
}

/// Runs `operation`, retrying on errors accepted by `is_retryable`.
///
/// # Errors
///
/// Returns [`RetryError::Permanent`] for the first non-retryable error and
/// [`RetryError::MaxAttemptsExceeded`] once `delays` is exhausted.
pub async fn retry<T, E, F, Fut, C>(
    mut operation: F,
    is_retryable: C,
    delays: &[Duration],
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let mut attempt = 0usize;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return Err(RetryError::Permanent(err));
        }

        let Some(delay) = delays.get(attempt) else {
            return Err(RetryError::MaxAttemptsExceeded {
                attempts: attempt + 1,
                source: err,
            });
        };

        attempt += 1;
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retryable error, waiting before next attempt"
        );
        tokio::time::sleep(*delay).await;
    }
}
