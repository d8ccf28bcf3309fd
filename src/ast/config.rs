//! Execution configuration (immutable for an execution's lifetime)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlanexError, Result};

/// Knobs supplied when a plan is submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Retries after the first attempt (0 = single attempt)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base: delay before retry k is `retry_delay_ms * 2^(k-1)`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Cap on a single backoff delay
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default)]
    pub enable_rollback: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Max steps in RUNNING at once (>= 1)
    #[serde(default = "default_parallel_limit")]
    pub parallel_execution_limit: usize,
    /// Plan-level timeout; expiry cancels the execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_parallel_limit() -> usize {
    5
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            enable_rollback: false,
            continue_on_error: false,
            parallel_execution_limit: default_parallel_limit(),
            timeout_ms: None,
        }
    }
}

impl ExecutionConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    pub fn with_max_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.max_retry_delay_ms = delay_ms;
        self
    }

    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.enable_rollback = enabled;
        self
    }

    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    pub fn with_parallel_limit(mut self, limit: usize) -> Self {
        self.parallel_execution_limit = limit;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Reject configs the scheduler cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.parallel_execution_limit == 0 {
            return Err(PlanexError::InvalidConfig {
                reason: "parallelExecutionLimit must be at least 1".to_string(),
            });
        }
        if self.max_retry_delay_ms < self.retry_delay_ms {
            return Err(PlanexError::InvalidConfig {
                reason: format!(
                    "maxRetryDelayMs ({}) is below retryDelayMs ({})",
                    self.max_retry_delay_ms, self.retry_delay_ms
                ),
            });
        }
        Ok(())
    }
}
