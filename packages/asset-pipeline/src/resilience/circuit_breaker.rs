//! Circuit breaker shared by every call to the reasoning service.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

struct BreakerState {
    failures: VecDeque<Instant>,
    open_until: Option<Instant>,
}

/// Opens after `threshold` failures inside `window` and stays open for
/// `cooldown`, failing calls fast. After the cooldown it closes again with
/// a clean failure history.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: usize,
    window: Duration,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState {
                failures: VecDeque::new(),
                open_until: None,
            }),
            threshold: threshold.max(1) as usize,
            window,
            cooldown,
        }
    }

    /// Whether calls are currently refused.
    pub async fn is_open(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                state.open_until = None;
                state.failures.clear();
                info!("Circuit breaker closed after cooldown");
                false
            }
            None => false,
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.failures.clear();
    }

    pub async fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        while state
            .failures
            .front()
            .is_some_and(|&at| now.duration_since(at) > self.window)
        {
            state.failures.pop_front();
        }
        state.failures.push_back(now);

        if state.open_until.is_none() && state.failures.len() >= self.threshold {
            state.open_until = Some(now + self.cooldown);
            warn!(
                failures = state.failures.len(),
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker opened"
            );
        }
    }

    /// Failures currently counted inside the window.
    pub async fn failure_count(&self) -> usize {
        self.state.lock().await.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let cb = breaker();
        cb.record_failure().await;
        cb.record_failure().await;
        assert!(!cb.is_open().await);

        cb.record_failure().await;
        assert!(cb.is_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_after_cooldown() {
        let cb = breaker();
        for _ in 0..3 {
            cb.record_failure().await;
        }
        assert!(cb.is_open().await);

        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(!cb.is_open().await);
        assert_eq!(cb.failure_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_failures_leave_the_window() {
        let cb = breaker();
        cb.record_failure().await;
        cb.record_failure().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        cb.record_failure().await;

        assert!(!cb.is_open().await);
        assert_eq!(cb.failure_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let cb = breaker();
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        assert!(!cb.is_open().await);
    }
}
