//! Exponential backoff retry
//!
//! An operation is attempted once and then retried up to `max_retries`
//! times while it fails with a retryable error. The delay before retry `n`
//! (1-based) is `base_delay * 2^(n-1)`: 1s, 2s, 4s with the defaults.

use std::future::Future;
use std::time::Duration;

use crate::error::UploadError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds, fails terminally, or retries run out
    ///
    /// The error of the last attempt is returned unchanged.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, UploadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        self.run_while(operation_name, UploadError::is_retryable, operation)
            .await
    }

    /// Like `run`, but only errors accepted by `should_retry` are retried
    pub async fn run_while<P, F, Fut, T>(
        &self,
        operation_name: &str,
        should_retry: P,
        mut operation: F,
    ) -> Result<T, UploadError>
    where
        P: Fn(&UploadError) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let mut retry = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if retry > 0 {
                        tracing::info!(
                            operation = operation_name,
                            retries = retry,
                            "Upload succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) if !should_retry(&err) => {
                    tracing::debug!(
                        operation = operation_name,
                        error = %err,
                        "Non-retryable error, giving up"
                    );
                    return Err(err);
                }
                Err(err) if retry >= self.max_retries => {
                    tracing::error!(
                        operation = operation_name,
                        attempts = retry + 1,
                        error = %err,
                        "Upload failed: retries exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        operation = operation_name,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Upload attempt failed, will retry after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
