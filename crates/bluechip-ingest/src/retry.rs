//! Exponential-backoff retry for transient failures.

use crate::error::{IngestError, Result};
use crate::rate_limiter::RateLimiter;
use bluechip_core::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retries an operation on transient errors, doubling the delay each time.
///
/// With `max_retries = n` an operation is attempted at most `n + 1` times.
/// Errors that are not retryable are returned immediately without using up
/// the retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
        )
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted, the first
    /// non-retryable error, or `IngestError::Cancelled`.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut retries = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        "{} failed (retry {}/{}), retrying in {:?}: {}",
                        label,
                        retries,
                        self.max_retries,
                        backoff,
                        e
                    );

                    tokio::select! {
                        () = cancel.cancelled() => return Err(IngestError::Cancelled),
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            "{} failed after {} retries: {}",
                            label,
                            self.max_retries,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), but every attempt first acquires
    /// `limiter`, since the window may have moved on during a backoff.
    pub async fn execute_throttled<T, F, Fut>(
        &self,
        limiter: &RateLimiter,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(label, cancel, || {
            let call = op();
            async move {
                limiter.acquire(cancel).await?;
                call.await
            }
        })
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
