//! Resilient completion adapter: the one place retry policy lives.
//!
//! Wraps any [`CompletionService`] with
//! - a per-call deadline (`tokio::time::timeout`; expiry counts as transient)
//! - bounded exponential backoff on transient errors only
//! - a semaphore cap on in-flight calls, shared by every workflow using the
//!   same adapter
//!
//! The permit is held for one attempt and released during backoff so a
//! sleeping retry does not starve other jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use workflow_core::RetryPolicy;

use super::{CompletionError, CompletionRequest, CompletionService, SharedCompletionService};

pub struct ResilientCompletion {
    inner: SharedCompletionService,
    policy: RetryPolicy,
    call_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ResilientCompletion {
    pub fn new(
        inner: SharedCompletionService,
        policy: RetryPolicy,
        call_timeout: Duration,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            inner,
            policy,
            call_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
        }
    }

    /// Calls currently allowed to start without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CompletionError::Cancelled)?;

        match tokio::time::timeout(self.call_timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(self.call_timeout)),
        }
    }
}

#[async_trait]
impl CompletionService for ResilientCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut retries = 0;
        loop {
            match self.attempt(request).await {
                Ok(text) => {
                    if retries > 0 {
                        debug!(stage = %request.stage, retries, "Completion succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) if e.is_transient() && self.policy.should_retry(retries) => {
                    retries += 1;
                    let backoff = self.policy.backoff_duration(retries);
                    warn!(
                        stage = %request.stage,
                        attempt = retries,
                        max_retries = self.policy.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient completion error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionService;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use workflow_core::ModelStage;

    fn request() -> CompletionRequest {
        CompletionRequest::new(ModelStage::Generation, "sys", "user", 0.7)
    }

    fn resilient(inner: impl CompletionService + 'static, max_retries: u32) -> ResilientCompletion {
        ResilientCompletion::new(
            Arc::new(inner),
            RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            },
            Duration::from_secs(60),
            4,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_twice_then_success() {
        let mut mock = MockCompletionService::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_complete()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(CompletionError::Transient("HTTP 503".into())));
        mock.expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("third".to_string()));

        let adapter = resilient(mock, 2);
        assert_eq!(adapter.complete(&request()).await.unwrap(), "third");
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete()
            .times(3)
            .returning(|_| Err(CompletionError::Transient("HTTP 502".into())));

        let adapter = resilient(mock, 2);
        let err = adapter.complete(&request()).await.unwrap_err();
        assert_eq!(err, CompletionError::Transient("HTTP 502".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete().times(1).returning(|_| {
            Err(CompletionError::Rejected {
                status: 400,
                body: "bad request".into(),
            })
        });

        let adapter = resilient(mock, 2);
        assert!(matches!(
            adapter.complete(&request()).await,
            Err(CompletionError::Rejected { status: 400, .. })
        ));
    }

    struct Slow {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for Slow {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok("late".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let slow = Arc::new(Slow {
            delay: Duration::from_secs(120),
            calls: AtomicUsize::new(0),
        });
        let adapter = ResilientCompletion::new(
            slow.clone(),
            RetryPolicy {
                max_retries: 1,
                ..RetryPolicy::default()
            },
            Duration::from_secs(60),
            1,
        );
        let err = adapter.complete(&request()).await.unwrap_err();
        assert_eq!(err, CompletionError::Timeout(Duration::from_secs(60)));
        assert_eq!(slow.calls.load(Ordering::SeqCst), 2);
    }

    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for Gauge {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_semaphore_caps_in_flight_calls() {
        let gauge = Arc::new(Gauge {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let adapter = Arc::new(ResilientCompletion::new(
            gauge.clone(),
            RetryPolicy::none(),
            Duration::from_secs(60),
            2,
        ));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let adapter = adapter.clone();
            set.spawn(async move { adapter.complete(&request()).await });
        }
        while let Some(result) = set.join_next().await {
            assert_eq!(result.unwrap().unwrap(), "ok");
        }

        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.available_permits(), 2);
    }
}
