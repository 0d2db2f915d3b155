//! Retry policy shared by everything that talks to an upstream
//!
//! A policy is an attempt budget plus a delay function. The gold rate
//! service applies one policy uniformly to every rate source.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Delay before the next attempt, given the 1-based number of the attempt
/// that just failed
type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Attempt budget with a delay function
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelayFn,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new<D>(max_attempts: u32, delay: D) -> Self
    where
        D: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Arc::new(delay),
        }
    }

    /// Linear backoff: waits `step`, `2 * step`, ... between attempts
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self::new(max_attempts, move |attempt| step.saturating_mul(attempt))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        (self.delay)(attempt)
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the
    /// budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, R>(&self, label: &str, mut op: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.delay(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {}ms",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
