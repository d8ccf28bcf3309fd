//! Resilience patterns for tool invocation
//!
//! - `retry`: exponential backoff seeded by the execution's `retryDelayMs`

mod retry;

pub use retry::{Exhausted, RetryAttempt, RetryConfig, RetryPolicy};
