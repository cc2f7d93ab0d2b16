//! Fixed-count retry.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Invoke an operation up to `attempts` times with a fixed sleep between
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRetry {
    pub attempts: u32,
    pub interval: Duration,
}

impl FixedRetry {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Run `op`, passing the 1-based attempt number. Returns the last error
    /// once the budget is spent. A budget of 0 still makes one attempt.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(self.interval).await;
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

    #[tokio::test]
    async fn test_stops_after_budget() {
        let calls = AtomicU32::new(0);
        let retry = FixedRetry::new(3, Duration::from_millis(1));
        let result: Result<(), String> = retry
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let retry = FixedRetry::new(5, Duration::from_millis(1));
        let result: Result<u32, String> = retry
            .run(|attempt| async move {
                if attempt < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_budget_tries_once() {
        let calls = AtomicU32::new(0);
        let retry = FixedRetry::new(0, Duration::from_millis(1));
        let _: Result<(), String> = retry
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("x".to_string()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
