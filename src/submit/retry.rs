use std::future::Future;
use std::time::Duration;

use futures_timer::Delay;

use crate::config::ApiConfig;

/// Errors that can tell a rate-limit rejection apart from everything else.
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;

    /// Server-suggested wait, when the response carried one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl From<&ApiConfig> for RetryPolicy {
    fn from(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts,
            delay: config.retry_delay(),
        }
    }
}

/// Runs `operation` until it succeeds, fails with something other than a rate
/// limit, or runs out of attempts. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignal,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && error.is_rate_limited() => {
                let wait = error.retry_after().unwrap_or(policy.delay);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "rate limited; retrying"
                );
                Delay::new(wait).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
