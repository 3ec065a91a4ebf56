//! A small circuit breaker wrapping outbound HTTP calls to the engine and
//! the downstream system, adapted from the reference workspace's
//! `tasker-shared::resilience::behavior` module.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a trial call.
    pub reset_timeout: Duration,
    /// Successful trial calls required in half-open state to close again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Tracks failure/success counts and gates calls through `Closed` /
/// `Open` / `HalfOpen` states. Cheap enough to share behind an `Arc` and
/// call on every request without contention beyond a couple of atomics.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    state: std::sync::Mutex<CircuitState>,
    opened_at_millis: AtomicU64,
    start: Instant,
}

#[derive(Debug, thiserror::Error)]
#[error("circuit breaker is open, rejecting call")]
pub struct CircuitOpenError;

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            state: std::sync::Mutex::new(CircuitState::Closed),
            opened_at_millis: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn state(&self) -> CircuitState {
        *self.state.lock().expect("circuit breaker mutex poisoned")
    }

    fn transition_if_open_timeout_elapsed(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        if *state == CircuitState::Open {
            let elapsed = self.now_millis().saturating_sub(self.opened_at_millis.load(Ordering::Relaxed));
            if elapsed >= self.config.reset_timeout.as_millis() as u64 {
                *state = CircuitState::HalfOpen;
                self.consecutive_successes.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Runs `f` if the breaker allows it; returns `Err(CircuitOpenError)`
    /// without calling `f` if the breaker is open.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerOutcome<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.transition_if_open_timeout_elapsed();
        if self.state() == CircuitState::Open {
            return Err(CircuitBreakerOutcome::Open(CircuitOpenError));
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerOutcome::CallFailed(err))
            }
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        if *state == CircuitState::HalfOpen {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
            if successes >= self.config.success_threshold {
                *state = CircuitState::Closed;
            }
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                self.opened_at_millis.store(self.now_millis(), Ordering::Relaxed);
            }
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    *state = CircuitState::Open;
                    self.opened_at_millis.store(self.now_millis(), Ordering::Relaxed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.state()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerOutcome<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),
    #[error("call failed: {0}")]
    CallFailed(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        for _ in 0..3 {
            let result: Result<(), CircuitBreakerOutcome<&str>> =
                breaker.call(|| async { Err("boom") }).await;
            assert!(matches!(result, Err(CircuitBreakerOutcome::CallFailed(_))));
        }

        assert_eq!(breaker.current_state(), CircuitState::Open);

        let result: Result<(), CircuitBreakerOutcome<&str>> =
            breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerOutcome::Open(_))));
    }

    #[tokio::test]
    async fn stays_closed_under_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        for _ in 0..2 {
            let _: Result<(), CircuitBreakerOutcome<&str>> =
                breaker.call(|| async { Err("boom") }).await;
        }
        assert_eq!(breaker.current_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        let _: Result<(), CircuitBreakerOutcome<&str>> =
            breaker.call(|| async { Err("boom") }).await;
        let _: Result<(), CircuitBreakerOutcome<&str>> = breaker.call(|| async { Ok(()) }).await;
        let _: Result<(), CircuitBreakerOutcome<&str>> =
            breaker.call(|| async { Err("boom") }).await;

        assert_eq!(breaker.current_state(), CircuitState::Closed);
    }
}
