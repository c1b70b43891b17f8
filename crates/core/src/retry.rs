use crate::SynthesisError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Capped exponential backoff for language model calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or `max_attempts` is reached.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, SynthesisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SynthesisError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) if attempt >= max_attempts => {
                    return Err(if max_attempts == 1 {
                        error
                    } else {
                        SynthesisError::Exhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        }
                    });
                }
                Err(error) => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!(attempt, ?delay, %error, "retrying language model call");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
