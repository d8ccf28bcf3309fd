//! Retry with exponential backoff
//!
//! Every failure handed to the policy is retried; callers decide what is
//! retryable before they get here (resolution errors never reach it).
//!
//! # Example
//!
//! ```rust,ignore
//! use planex::resilience::{RetryConfig, RetryPolicy};
//!
//! let policy = RetryPolicy::new(RetryConfig::from(&execution_config));
//! let result = policy
//!     .execute(|attempt| async move { call_tool(attempt).await }, |retry| {
//!         tracing::warn!(retry = retry.retry, "retrying");
//!     })
//!     .await;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::ast::ExecutionConfig;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting initial attempt)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles delay each time)
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0), 0 keeps delays deterministic
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl From<&ExecutionConfig> for RetryConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            ..Self::default()
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set jitter factor (0.0 to 1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

/// Handed to the retry hook before each backoff sleep
#[derive(Debug)]
pub struct RetryAttempt<'e, E> {
    /// 1-based retry number (1 = first retry)
    pub retry: u32,
    pub delay: Duration,
    /// Error of the attempt that just failed
    pub error: &'e E,
}

/// Retry budget spent; carries the last failure
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted<E> {
    /// Total attempts made (initial + retries)
    pub attempts: u32,
    pub last_error: E,
}

/// Retry policy that executes operations with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay after failed attempt `attempt` (0-indexed): initial * multiplier^attempt, capped
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.config.max_delay.as_millis() as f64);

        let jittered_delay = if self.config.jitter > 0.0 {
            let jitter_range = capped_delay * self.config.jitter;
            let jitter_offset = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
            (capped_delay + jitter_offset).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(jittered_delay as u64)
    }

    /// Run `operation` up to `max_retries + 1` times
    ///
    /// `operation` receives the 0-based attempt number. `on_retry` runs after a
    /// failure that will be retried, before the backoff sleep.
    pub async fn execute<F, Fut, T, E, H>(
        &self,
        mut operation: F,
        mut on_retry: H,
    ) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(RetryAttempt<'_, E>),
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.config.max_retries {
                        return Err(Exhausted {
                            attempts: attempt + 1,
                            last_error: error,
                        });
                    }

                    let delay = self.calculate_delay(attempt);
                    on_retry(RetryAttempt {
                        retry: attempt + 1,
                        delay,
                        error: &error,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
