//! Timeout, retry, rate limiting and circuit-breaking around a
//! [`ReasoningService`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AnalysisError, AnalyzeResult, ServiceError};
use crate::resilience::{CircuitBreaker, RequestLimiter, RetryPolicy};
use crate::traits::reasoning::{ReasoningRequest, ReasoningService};
use crate::types::config::ReasoningConfig;

/// Wraps a reasoning service with, in order: the breaker check, the
/// process-wide quota, a per-call timeout and bounded retry of transient
/// failures.
///
/// One `GuardedService` is shared by every source of a run, so the breaker
/// carries failure signal across sources.
pub struct GuardedService {
    inner: Arc<dyn ReasoningService>,
    breaker: CircuitBreaker,
    limiter: RequestLimiter,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GuardedService {
    pub fn new(inner: Arc<dyn ReasoningService>, config: &ReasoningConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(
                config.breaker_threshold,
                Duration::from_secs(config.breaker_window_secs),
                Duration::from_secs(config.breaker_cooldown_secs),
            ),
            limiter: RequestLimiter::per_second(config.requests_per_second),
            timeout: config.timeout(),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Send one request under the full guard stack.
    pub async fn call(&self, request: ReasoningRequest) -> AnalyzeResult<String> {
        if self.breaker.is_open().await {
            return Err(AnalysisError::ServiceUnavailable(
                "circuit breaker is open".to_string(),
            ));
        }

        let mut attempt = 1;
        loop {
            self.limiter.until_ready().await;
            debug!(step = %request.step, attempt, service = self.inner.name(), "Calling reasoning service");

            let outcome = tokio::time::timeout(self.timeout, self.inner.complete(request.clone()))
                .await
                .unwrap_or(Err(ServiceError::Timeout));

            let err = match outcome {
                Ok(text) => {
                    self.breaker.record_success().await;
                    return Ok(text);
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                warn!(step = %request.step, error = %err, "Reasoning request rejected");
                return Err(AnalysisError::Api(err.to_string()));
            }

            self.breaker.record_failure().await;
            if self.breaker.is_open().await {
                return Err(AnalysisError::ServiceUnavailable(format!(
                    "circuit breaker opened after: {}",
                    err
                )));
            }
            if !self.retry.should_retry(attempt) {
                warn!(step = %request.step, error = %err, attempt, "Reasoning retries exhausted");
                return Err(AnalysisError::ServiceUnavailable(format!(
                    "{} (after {} attempts)",
                    err, attempt
                )));
            }

            let hint = match &err {
                ServiceError::RateLimited { retry_after } => *retry_after,
                _ => None,
            };
            let delay = self.retry.delay_with_hint(attempt, hint);
            warn!(
                step = %request.step,
                error = %err,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reasoning call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockReasoner;
    use crate::traits::reasoning::ReasoningStep;

    fn config() -> ReasoningConfig {
        ReasoningConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            breaker_threshold: 5,
            requests_per_second: 1000,
            ..ReasoningConfig::default()
        }
    }

    fn request() -> ReasoningRequest {
        ReasoningRequest::new(ReasoningStep::Summarize, "sys", "text")
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mock = Arc::new(
            MockReasoner::new()
                .with_response(ReasoningStep::Summarize, "summary")
                .fail_times(ReasoningStep::Summarize, 2, ServiceError::Transient("502".into())),
        );
        let guarded = GuardedService::new(mock.clone(), &config());

        assert_eq!(guarded.call(request()).await.unwrap(), "summary");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_service_unavailable() {
        let mock = Arc::new(
            MockReasoner::new()
                .fail_times(ReasoningStep::Summarize, 10, ServiceError::RateLimited { retry_after: None }),
        );
        let guarded = GuardedService::new(mock.clone(), &config());

        let err = guarded.call(request()).await.unwrap_err();
        assert_eq!(err.reason(), "service_unavailable");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let mock = Arc::new(
            MockReasoner::new()
                .fail_times(ReasoningStep::Summarize, 1, ServiceError::Fatal("bad key".into())),
        );
        let guarded = GuardedService::new(mock.clone(), &config());

        let err = guarded.call(request()).await.unwrap_err();
        assert_eq!(err.reason(), "api_error");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_fails_fast() {
        let mock = Arc::new(
            MockReasoner::new()
                .fail_times(ReasoningStep::Summarize, 100, ServiceError::Transient("down".into())),
        );
        let guarded = GuardedService::new(
            mock.clone(),
            &ReasoningConfig {
                breaker_threshold: 2,
                ..config()
            },
        );

        let first = guarded.call(request()).await.unwrap_err();
        assert_eq!(first.reason(), "service_unavailable");
        let calls_after_first = mock.call_count();
        assert_eq!(calls_after_first, 2);

        let second = guarded.call(request()).await.unwrap_err();
        assert_eq!(second.reason(), "service_unavailable");
        assert_eq!(mock.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn test_slow_calls_time_out() {
        let mock = Arc::new(
            MockReasoner::new()
                .with_response(ReasoningStep::Summarize, "late")
                .with_latency(Duration::from_millis(200)),
        );
        let guarded = GuardedService::new(mock.clone(), &config())
            .with_timeout(Duration::from_millis(10));

        let err = guarded.call(request()).await.unwrap_err();
        assert_eq!(err.reason(), "service_unavailable");
    }
}
