//! Fixed-delay retry for fallible async operations
//!
//! Remote transfer legs of the load job tolerate transient failures by
//! re-invoking the operation a configured number of times with a constant
//! wait between attempts. The delay does not grow and carries no jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of attempts for remote transfer operations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts (in seconds)
pub const DEFAULT_DELAY_SECS: u64 = 5;

/// Retry policy with a constant delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::from_secs(DEFAULT_DELAY_SECS))
    }
}

impl RetryPolicy {
    /// Create a policy with a total attempt budget and a constant delay
    ///
    /// An attempt budget of zero is clamped to one; the operation always
    /// runs at least once.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Total number of attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait between consecutive attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted
    ///
    /// Invokes `op` up to `max_attempts` times in total, sleeping `delay`
    /// between attempts. Every failure kind is retried uniformly; failures
    /// short of the budget log a warning, the final failure is returned.
    /// `label` names the operation in those warnings.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {}s...",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        self.delay.as_secs()
                    );
                    tokio::time::sleep(self.delay).await;
                },
                Err(e) => return Err(e),
            }
        }

        unreachable!("Retry loop should always return")
    }
}
