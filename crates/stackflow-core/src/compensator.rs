//! Consistency compensator
//!
//! Control planes acknowledge a write before every dependent API can see it.
//! Calls are retried with bounded exponential backoff when the provider
//! reports a transient condition: throttling for any node, "not yet visible"
//! only for nodes declared lag-sensitive. Permanent errors are never retried.

use stackflow_cloud::{ProviderError, RetryConfig, TransientReason};
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct Compensator {
    retry: RetryConfig,
}

/// Successful call and the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Compensated<T> {
    pub value: T,
    pub attempts: u32,
}

/// Call that did not succeed
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationFailure {
    pub error: ProviderError,
    pub attempts: u32,
    /// Retries were exhausted on a transient error
    pub exhausted: bool,
}

impl std::fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exhausted {
            write!(f, "{} (gave up after {} attempts)", self.error, self.attempts)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

impl Compensator {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn is_retryable(&self, error: &ProviderError, lag_sensitive: bool) -> bool {
        match error.transient_reason() {
            Some(TransientReason::Throttled) => true,
            Some(TransientReason::NotYetVisible) => lag_sensitive,
            None => false,
        }
    }

    /// Run `call` until it succeeds, fails permanently or attempts run out
    pub async fn call<T, F, Fut>(
        &self,
        logical_id: &str,
        lag_sensitive: bool,
        mut call: F,
    ) -> Result<Compensated<T>, CompensationFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(logical_id, attempt, "Provider call succeeded after retry");
                    }
                    return Ok(Compensated {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) if self.is_retryable(&error, lag_sensitive) => {
                    if attempt >= max_attempts {
                        warn!(logical_id, attempt, error = %error, "Giving up on transient error");
                        return Err(CompensationFailure {
                            error,
                            attempts: attempt,
                            exhausted: true,
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    warn!(
                        logical_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(CompensationFailure {
                        error,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
            }
        }
    }
}
