// ── Bounded retry with exponential backoff ──
//
// Only transient transport failures (connect, timeout) are retried.
// Validation and device-reported errors are deterministic and surface
// immediately.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::Error;

/// Retry configuration for device requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 3.
    pub max_attempts: u32,
    /// Delay before the second attempt. Default: 500ms.
    pub initial_backoff: Duration,
    /// Upper bound on backoff delay. Default: 5s.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    ///
    /// `delay = min(initial * 2^attempt, max) * jitter`, with a deterministic
    /// jitter in `[0.75, 1.25]` seeded from the attempt number.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(30)).unwrap_or(30);
        let base = self.initial_backoff.as_secs_f64() * 2f64.powi(exp);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Exhaustion is reported as [`Error::RetriesExhausted`] wrapping the last
    /// transient failure.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(Error::RetriesExhausted {
                            attempts,
                            last: Box::new(e),
                        });
                    }
                    let delay = self.backoff(attempt - 1);
                    debug!(%what, attempt, ?delay, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn timeout() -> Error {
        Error::Timeout {
            url: "http://device/api/x".into(),
            timeout_ms: 100,
        }
    }

    #[test]
    fn backoff_increases_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        };
        let d0 = policy.backoff(0);
        let d1 = policy.backoff(1);
        let d2 = policy.backoff(2);
        assert!(d0 >= Duration::from_millis(750) && d0 <= Duration::from_millis(1250));
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 50,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        };
        // Upper bound includes the +25% jitter.
        assert!(policy.backoff(20) <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_then_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = RetryPolicy::default()
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(timeout())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(timeout())
                }
            })
            .await;
        match result {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, Error::Timeout { .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        for err in [
            Error::Validation("bad byte count".into()),
            Error::Device {
                status: 404,
                message: "unknown path".into(),
            },
        ] {
            let calls = Arc::new(AtomicU32::new(0));
            let result: Result<(), _> = RetryPolicy::default()
                .run("test", || {
                    let calls = Arc::clone(&calls);
                    let err = err.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(err)
                    }
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
