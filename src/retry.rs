//! Bounded retry with exponential backoff and jitter
//!
//! External tool invocations (kubectl apply, cluster readiness probes) fail
//! transiently while a cluster is converging. This module retries them a
//! bounded number of times with exponential backoff; jitter spreads repeated
//! attempts so parallel health polls do not align.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Retry policy for a transiently-failing operation. Attempts are always
/// bounded; an operation that needs to wait indefinitely should use an
/// explicit deadline instead.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Cap applied to the growing delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// A config with the given attempt budget and default delays
    pub fn attempts(attempts: u32) -> Self {
        Self {
            attempts,
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
///
/// Returns the last error when every attempt fails. Delays double between
/// attempts (capped at `max_delay`) and carry 0.5x-1.5x jitter.
pub async fn retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = config.attempts.max(1);
    let mut delay = config.initial_delay;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt == attempts => return Err(e),
            Err(e) => {
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let sleep_for = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    delay_ms = sleep_for.as_millis(),
                    "transient failure, retrying"
                );
                tokio::time::sleep(sleep_for).await;
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
    unreachable!("loop returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn first_success_needs_no_retry() {
        let result: Result<u32, &str> = retry(&fast(3), "op", || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn recovers_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, &str> = retry(&fast(5), "op", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok(9)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_when_budget_spent() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, &str> = retry(&fast(3), "op", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("still broken")
            }
        })
        .await;
        assert_eq!(result, Err("still broken"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
