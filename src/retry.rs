use log::warn;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Longest pause between two attempts, whatever the attempt number.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Errors that say whether repeating the same request may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Exponential backoff for transient HTTP failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    max_attempts: u32,
    base_delay: Duration,
    /// Random jitter as a fraction of the delay, e.g. 0.25 = ±25%.
    jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// base_delay * 2^attempt, ±jitter, capped at [`MAX_DELAY`].
    fn backoff(&self, attempt: u32) -> Duration {
        let cap_ms = MAX_DELAY.as_millis() as u64;
        let base_ms = u64::try_from(self.base_delay.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(cap_ms);
        let jitter_range = (base_ms as f64 * self.jitter_factor) as u64;
        if jitter_range == 0 {
            return Duration::from_millis(base_ms);
        }
        let jitter = rand::rng().random_range(0..=jitter_range * 2) as i64 - jitter_range as i64;
        Duration::from_millis((base_ms as i64 + jitter).clamp(0, cap_ms as i64) as u64)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Retryable error: {}. Attempt {}/{} after {:?}",
                        err,
                        attempt + 1,
                        self.max_attempts,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
