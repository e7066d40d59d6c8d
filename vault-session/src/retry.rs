//! Retry with exponential backoff for transient transport failures.
//!
//! Only errors classified as retryable by [`VaultError::is_retryable`] are
//! retried; authentication and malformed-response failures surface at once.

use crate::error::{VaultError, VaultResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set maximum retries. Zero disables retrying.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Retry policy shared by the async and blocking transports.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Policy for `config`.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(RetryConfig::default().with_max_retries(0))
    }

    /// Backoff before retry number `attempt` (zero based).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let final_ms = if self.config.jitter {
            // Up to 25% on top.
            capped_ms * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Whether `error` on `attempt` should be retried.
    #[must_use]
    pub fn should_retry(&self, error: &VaultError, attempt: u32) -> bool {
        attempt < self.config.max_retries && error.is_retryable()
    }

    /// Maximum number of retries.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Run an async operation with retries.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted or the error is not
    /// retryable.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> VaultResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VaultResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(&error, attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying Vault request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Run a blocking operation with retries, sleeping the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted or the error is not
    /// retryable.
    pub fn execute_blocking<F, T>(&self, mut operation: F) -> VaultResult<T>
    where
        F: FnMut() -> VaultResult<T>,
    {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(&error, attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying Vault request");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_delay_calculation_no_jitter() {
        let policy = RetryPolicy::new(RetryConfig::default().without_jitter());
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .without_jitter()
                .with_max_delay(Duration::from_millis(150)),
        );
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(150));
    }

    #[test]
    fn test_should_retry_only_transient_errors() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&VaultError::RateLimited, 0));
        assert!(!policy.should_retry(&VaultError::RateLimited, 3));
        assert!(!policy.should_retry(&VaultError::auth_failed("denied"), 0));
        assert!(!RetryPolicy::disabled().should_retry(&VaultError::RateLimited, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_recovers_from_transient_failure() {
        let policy = RetryPolicy::new(RetryConfig::default().without_jitter());
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = policy
            .execute(|| async {
                if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Err(VaultError::unavailable("reset"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_execute_blocking_stops_on_permanent_error() {
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .without_jitter()
                .with_initial_delay(Duration::from_millis(1)),
        );
        let calls = Cell::new(0);
        let result: VaultResult<()> = policy.execute_blocking(|| {
            calls.set(calls.get() + 1);
            Err(VaultError::not_found("secret/app"))
        });
        assert!(matches!(result, Err(VaultError::SecretNotFound(_))));
        assert_eq!(calls.get(), 1);
    }
}
