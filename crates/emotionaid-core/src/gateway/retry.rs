//! Exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::CompanionResult;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(4);
/// Upper bound for any single delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry policy applied by the gateway.
///
/// Only transient errors ([`crate::CompanionError::Network`]) are retried.
/// Rejections are returned to the caller immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `operation`, retrying transient failures with backoff.
    pub async fn run<T, F, Fut>(&self, action: &str, mut operation: F) -> CompanionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CompanionResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    warn!(action, attempt, ?delay, error = %err, "Remote call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
