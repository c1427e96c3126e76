//! Three-state circuit breaker for calls to the external payment processor
//! (§4.3 "Resilient external client", §9 "Circuit breaker").

use {
    std::sync::atomic::{AtomicU32, AtomicU8, Ordering},
    std::time::{Duration, Instant},
    tokio::sync::Mutex,
};

#[derive(Clone, Copy, Debug)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for State {
    fn from(v: u8) -> Self {
        match v {
            1 => State::Open,
            2 => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

/// Closed admits every call and counts consecutive failures. `failure_threshold`
/// consecutive failures trip it to open. Open short-circuits every call to the
/// fallback until `open_timeout` elapses, then moves to half-open. Half-open
/// admits calls one at a time; `success_threshold` consecutive successes close
/// it again, a single failure reopens it.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(State::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    /// Runs `call` if the breaker admits it, otherwise returns `fallback`
    /// without invoking `call` at all.
    pub async fn call<T, E, F, Fut, Fb>(&self, call: F, fallback: Fb) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        Fb: FnOnce() -> E,
    {
        if !self.admit().await {
            return Err(fallback());
        }
        match call().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(err)
            }
        }
    }

    async fn admit(&self) -> bool {
        match State::from(self.state.load(Ordering::SeqCst)) {
            State::Closed => true,
            State::HalfOpen => true,
            State::Open => {
                let mut opened_at = self.opened_at.lock().await;
                match *opened_at {
                    Some(at) if at.elapsed() >= self.config.open_timeout => {
                        self.state.store(State::HalfOpen as u8, Ordering::SeqCst);
                        self.consecutive_successes.store(0, Ordering::SeqCst);
                        *opened_at = None;
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    async fn on_success(&self) {
        match State::from(self.state.load(Ordering::SeqCst)) {
            State::Closed => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            State::HalfOpen => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.state.store(State::Closed as u8, Ordering::SeqCst);
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                }
            }
            State::Open => {}
        }
    }

    async fn on_failure(&self) {
        match State::from(self.state.load(Ordering::SeqCst)) {
            State::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.trip().await;
                }
            }
            State::HalfOpen => self.trip().await,
            State::Open => {}
        }
    }

    async fn trip(&self) {
        self.state.store(State::Open as u8, Ordering::SeqCst);
        *self.opened_at.lock().await = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_consecutive_failures_and_short_circuits() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            open_timeout: Duration::from_secs(60),
        });

        for _ in 0..2 {
            let result: Result<(), &str> = breaker
                .call(|| async { Err("boom") }, || "boom")
                .await;
            assert_eq!(result, Err("boom"));
        }

        let result: Result<(), &str> = breaker
            .call(|| async { Ok(()) }, || "fallback")
            .await;
        assert_eq!(result, Err("fallback"));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold_once_timeout_elapses() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            open_timeout: Duration::from_millis(10),
        });

        let _: Result<(), &str> = breaker.call(|| async { Err("boom") }, || "boom").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result: Result<(), &str> = breaker.call(|| async { Ok(()) }, || "fallback").await;
        assert_eq!(result, Ok(()));

        // Breaker is closed again; a fresh failure should not short-circuit
        // the very next call.
        let result: Result<(), &str> = breaker.call(|| async { Ok(()) }, || "fallback").await;
        assert_eq!(result, Ok(()));
    }
}
