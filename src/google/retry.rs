use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::{ConnectorError, UpstreamFailure};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Failures that can tell whether another attempt might succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for UpstreamFailure {
    fn is_transient(&self) -> bool {
        UpstreamFailure::is_transient(self)
    }
}

impl Transient for ConnectorError {
    fn is_transient(&self) -> bool {
        match self {
            ConnectorError::Upstream(f) => f.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry(Duration),
    Surface,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// initial_delay * 2^attempt_index, no jitter.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt_index).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }

    /// Classify a failure of attempt `attempt_index` (0-based).
    pub fn decide<E: Transient>(&self, attempt_index: u32, failure: &E) -> Decision {
        if !failure.is_transient() {
            return Decision::Surface;
        }
        if attempt_index + 1 >= self.max_attempts.max(1) {
            return Decision::Surface;
        }
        Decision::Retry(self.delay_for(attempt_index))
    }
}

/// Waits between attempts. Swappable so backoff can be observed without real timers.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs upstream operations under a bounded retry budget.
#[derive(Clone)]
pub struct ResilientInvoker {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ResilientInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `operation` until it succeeds, fails permanently, or the attempt
    /// budget runs out. The last failure is returned as-is.
    pub async fn invoke<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt_index = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt_index > 0 {
                        debug!(attempts = attempt_index + 1, "upstream call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => match self.policy.decide(attempt_index, &failure) {
                    Decision::Retry(delay) => {
                        warn!(
                            "Attempt {}/{} failed: {}. Retrying in {:?}...",
                            attempt_index + 1,
                            self.policy.max_attempts,
                            failure,
                            delay
                        );
                        self.sleeper.sleep(delay).await;
                        attempt_index += 1;
                    }
                    Decision::Surface => return Err(failure),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn invoker(sleeper: Arc<RecordingSleeper>) -> ResilientInvoker {
        ResilientInvoker::new(RetryPolicy::default()).with_sleeper(sleeper)
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        // Huge indices saturate instead of overflowing
        assert!(policy.delay_for(64) >= policy.delay_for(31));
    }

    #[test]
    fn test_decide_surfaces_permanent_failures() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0, &UpstreamFailure::http(404)), Decision::Surface);
        assert_eq!(
            policy.decide(0, &UpstreamFailure::http(429)),
            Decision::Retry(Duration::from_millis(1000))
        );
        assert_eq!(policy.decide(2, &UpstreamFailure::http(503)), Decision::Surface);
    }

    #[test]
    fn test_zero_attempt_budget_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.decide(0, &UpstreamFailure::http(500)), Decision::Surface);
    }

    #[tokio::test]
    async fn test_429_twice_then_success() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result = invoker(sleeper.clone())
            .invoke(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(UpstreamFailure::http(429))
                    } else {
                        Ok("rows")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("rows"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_404_surfaces_without_retry() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = invoker(sleeper.clone())
            .invoke(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamFailure::http(404)) }
            })
            .await;

        assert_eq!(result, Err(UpstreamFailure::http(404)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_failure_unchanged() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = invoker(sleeper.clone())
            .invoke(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(UpstreamFailure::Http {
                        status: 500 + n as u16,
                        detail: Some(format!("backend error {}", n)),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result,
            Err(UpstreamFailure::Http {
                status: 502,
                detail: Some("backend error 2".into()),
            })
        );
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_connector_errors_other_than_upstream_are_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), ConnectorError> = invoker(sleeper)
            .invoke(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ConnectorError::NotConnected {
                        website_id: "site-1".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ConnectorError::NotConnected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
