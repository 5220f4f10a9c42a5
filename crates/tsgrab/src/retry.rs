//! Bounded retry loops.
//!
//! Segment acquisition retries with a fixed delay; cleanup of temporary
//! artifacts retries with a linearly growing delay while the filesystem
//! releases handles held by the transcode tool.

use std::future::Future;
use std::time::Duration;

use tracing::trace;

/// Delay schedule between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt
    Fixed(Duration),
    /// `base * n` after the n-th failed attempt (1s, 2s, 3s, ...)
    Linear(Duration),
}

impl Backoff {
    /// Delay to wait after the `failed_attempt`-th failure (1-based).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(base) => base.saturating_mul(failed_attempt.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub const fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear(base),
        }
    }

    /// Runs `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. On exhaustion the error of the
    /// last attempt is returned.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_while(|_| true, op).await
    }

    /// Like [`RetryPolicy::run`], but gives up as soon as `should_retry`
    /// rejects an error, returning that error without waiting.
    pub async fn run_while<T, E, P, F, Fut>(&self, should_retry: P, mut op: F) -> Result<T, E>
    where
        P: Fn(&E) -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts || !should_retry(&e) => return Err(e),
                Err(_) => {
                    let delay = self.backoff.delay_for(attempt);
                    trace!(attempt, ?delay, "Attempt failed, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_delays() {
        let fixed = Backoff::Fixed(Duration::from_millis(500));
        assert_eq!(fixed.delay_for(1), Duration::from_millis(500));
        assert_eq!(fixed.delay_for(50), Duration::from_millis(500));

        let linear = Backoff::Linear(Duration::from_secs(1));
        assert_eq!(linear.delay_for(1), Duration::from_secs(1));
        assert_eq!(linear.delay_for(2), Duration::from_secs(2));
        assert_eq!(linear.delay_for(3), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let result: Result<u32, &str> = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { if attempt < 3 { Err("boom") } else { Ok(attempt) } }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(4, Duration::ZERO);

        let result: Result<(), String> = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("attempt {attempt}")) }
            })
            .await;

        assert_eq!(result, Err("attempt 4".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_rejected_error_stops_retrying() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(10, Duration::ZERO);

        let result: Result<(), String> = policy
            .run_while(
                |e: &String| e != "fatal",
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err("transient".to_string())
                        } else {
                            Err("fatal".to_string())
                        }
                    }
                },
            )
            .await;

        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::linear(0, Duration::ZERO);
        let result: Result<(), ()> = policy.run(|_| async { Err(()) }).await;
        assert_eq!(result, Err(()));
    }
}
