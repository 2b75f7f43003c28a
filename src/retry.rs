// ABOUTME: Exponential backoff and retry of idempotent control plane calls.
// ABOUTME: Only errors that report themselves as transient are retried.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that may succeed if the same call is repeated.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Exponential backoff schedule: `initial * multiplier^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: u32,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: u32, max: Duration) -> Self {
        Self {
            current: initial,
            multiplier: multiplier.max(1),
            max,
        }
    }

    /// The next delay to wait for.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }

    pub async fn wait(&mut self) {
        tokio::time::sleep(self.next_delay()).await
    }
}

/// How many times to try a call and how long to wait between tries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_initial", with = "humantime_serde")]
    pub initial: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    #[serde(default = "default_max", with = "humantime_serde")]
    pub max: Duration,
}

fn default_attempts() -> u32 {
    5
}

fn default_initial() -> Duration {
    Duration::from_millis(200)
}

fn default_multiplier() -> u32 {
    2
}

fn default_max() -> Duration {
    Duration::from_secs(10)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial: default_initial(),
            multiplier: default_multiplier(),
            max: default_max(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            ..Default::default()
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial, self.multiplier, self.max)
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are exhausted. Returns the last error.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, E>
where
    E: Transient + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = policy.backoff();
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    operation,
                    attempt,
                    attempts,
                    ?delay,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(operation, attempts, error = %e, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky (transient: {})", self.0)
        }
    }

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(100), 2, Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = retry(&RetryPolicy::default(), "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(Flaky(true)) } else { Ok(n) }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = retry(&RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Flaky(false))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_configured_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            ..Default::default()
        };
        let result: Result<(), Flaky> = retry(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Flaky(true))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
