use super::error::LlmError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Pause after the given failed attempt (1-based): base, 2x base, 4x base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_DELAY)
    }
}

/// Runs `op` until it succeeds, fails permanently or runs out of attempts.
/// `op` receives the 1-based attempt number.
pub async fn with_backoff<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempt >= attempts => {
                return Err(LlmError::Exhausted {
                    attempts,
                    last: Box::new(e),
                })
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "LLM attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
