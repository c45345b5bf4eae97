use super::policy::BackoffPolicy;
use super::types::RetryConfig;
use backoff::backoff::Backoff;
use tracing::{debug, warn};

/// Retry executor with jittered exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: BackoffPolicy,
    max_attempts: u32,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            policy: BackoffPolicy::from_config(config),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Execute with retries, but only if error matches predicate.
    ///
    /// An error for which `should_retry` returns false is returned at once,
    /// without sleeping and without spending the remaining attempts.
    pub async fn execute_with_predicate<F, Fut, T, E, P>(
        &self,
        mut f: F,
        should_retry: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut schedule = self.policy.schedule();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                attempt,
                max_attempts = self.max_attempts,
                "Executing request"
            );

            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Request succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !should_retry(&e) {
                        debug!(attempt, error = %e, "Error not retryable");
                        return Err(e);
                    }

                    if attempt >= self.max_attempts {
                        warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %e,
                            "Request failed after max attempts"
                        );
                        return Err(e);
                    }

                    if let Some(wait) = schedule.next_backoff() {
                        debug!(
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            error = %e,
                            "Request failed, retrying after backoff"
                        );
                        tokio::time::sleep(wait).await;
                    } else {
                        warn!(attempt, error = %e, "Backoff exhausted");
                        return Err(e);
                    }
                }
            }
        }
    }
}
