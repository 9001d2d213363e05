use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::EngineError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

pub trait BackoffPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 100,
        }
    }
}

impl BackoffPolicy for RetryPolicy {
    /// Doubles per attempt, starting at `base_backoff_ms` after the first failure.
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1u64 << exponent))
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// `max_attempts` is used up. Exhaustion surfaces as
    /// [`EngineError::Transient`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(EngineError::Transient {
                        attempts: attempt,
                        message: describe(&err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn describe(err: &EngineError) -> String {
    match err {
        EngineError::Transient { message, .. } => message.clone(),
        EngineError::Database(e) => e.to_string(),
        other => other.to_string(),
    }
}
