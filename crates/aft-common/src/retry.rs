//! Bounded polling for eventually-consistent state.

use log::debug;
use std::fmt;
use std::time::Duration;

/// Returned when a [`RetryPolicy`] runs out of attempts.
///
/// Carries the last observed value so callers can report what the state
/// looked like when they gave up.
#[derive(Debug, Clone)]
pub struct RetryExhausted<T> {
    pub attempts: u32,
    pub last: T,
}

impl<T> fmt::Display for RetryExhausted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition not met after {} attempts", self.attempts)
    }
}

impl<T: fmt::Debug> std::error::Error for RetryExhausted<T> {}

/// Fixed-interval retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Evaluates `probe` until `done` accepts its output.
    ///
    /// `probe` always runs at least once; the policy sleeps `interval`
    /// between attempts but not after the last one.
    pub async fn poll_until<T, P, D>(&self, mut probe: P, done: D) -> Result<T, RetryExhausted<T>>
    where
        P: FnMut() -> T,
        D: Fn(&T) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let value = probe();
            if done(&value) {
                return Ok(value);
            }
            if attempt >= attempts {
                return Err(RetryExhausted {
                    attempts,
                    last: value,
                });
            }
            debug!("RetryPolicy: attempt {}/{} not converged", attempt, attempts);
            attempt += 1;
            tokio::time::sleep(self.interval).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(100))
    }
}
