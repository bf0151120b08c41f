//! `CircuitBreaker`: per-provider adaptive breaker with exponential backoff
//!
//! Transcribed from the adaptive-threshold and backoff formulas of
//! `original_source/backend/agents/circuit_breaker_manager.py` (see `DESIGN.md`). State
//! mutation is serialized by a single breaker-local `Mutex`, matching §5's concurrency model
//! ("per-breaker state machine updates are serialized by a breaker-local exclusion region").

use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::BreakerConfig;
use super::domain_types::{BreakerSnapshot, BreakerState, Sample, SampleWindow};
use super::traits::BreakerError;
use crate::time_provider::SharedTimeProvider;

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    trip_count: u64,
    last_failure: Option<Instant>,
    backoff_multiplier: f64,
    samples: SampleWindow,
}

/// A single provider's breaker. Lives for the process lifetime once constructed by a
/// [`super::fabric::BreakerFabric`].
pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    time: SharedTimeProvider,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(provider: impl Into<String>, config: BreakerConfig, time: SharedTimeProvider) -> Self {
        let capacity = config.sample_window_capacity;
        Self {
            provider: provider.into(),
            config,
            time,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                trip_count: 0,
                last_failure: None,
                backoff_multiplier: 1.0,
                samples: SampleWindow::new(capacity),
            }),
        }
    }

    /// Adaptive `(threshold_now, timeout_now_ms)` derived from the sliding sample window,
    /// per §4.3's three bands.
    fn adaptive(&self, inner: &Inner) -> (u32, u64) {
        let base_threshold = self.config.base_threshold;
        let base_timeout = self.config.base_timeout_ms as f64;
        let rate = inner.samples.error_rate();
        let n = inner.samples.len();

        if rate > 0.5 {
            let threshold = (base_threshold / 2).max(2);
            let timeout = (base_timeout * 3.0).min(300_000.0) as u64;
            (threshold, timeout)
        } else if rate > 0.2 {
            let threshold = ((f64::from(base_threshold)) * 0.7).max(1.0).round() as u32;
            let timeout = (base_timeout * 2.0).min(180_000.0) as u64;
            (threshold, timeout)
        } else if rate < 0.05 && n >= 50 {
            let threshold = (base_threshold * 2).min(15);
            let timeout = (base_timeout * 0.5).max(15_000.0) as u64;
            (threshold, timeout)
        } else {
            (base_threshold, self.config.base_timeout_ms)
        }
    }

    /// Decides whether a call may proceed right now, transitioning `open -> half_open` if
    /// the cool-down has elapsed. Returns `CircuitOpen` when the call must be refused.
    async fn guard(&self) -> Result<(), BreakerError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let (_, timeout_now_ms) = self.adaptive(&inner);
                let effective_timeout_ms = (timeout_now_ms as f64 * inner.backoff_multiplier) as u64;
                let elapsed_ms = inner
                    .last_failure
                    .map(|t| self.time.instant().duration_since(t).as_millis() as u64)
                    .unwrap_or(u64::MAX);
                if elapsed_ms >= effective_timeout_ms {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    info!(provider = %self.provider, "breaker: open -> half_open probe");
                    Ok(())
                } else {
                    Err(BreakerError::CircuitOpen {
                        provider: self.provider.clone(),
                    })
                }
            }
        }
    }

    async fn record_success(&self, latency_ms: u64) {
        let mut inner = self.inner.lock().await;
        inner.samples.push(Sample {
            latency_ms,
            is_error: false,
        });
        match inner.state {
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                let k = (inner.trip_count + 1).min(3) as u32;
                if inner.half_open_successes >= k {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.backoff_multiplier = (inner.backoff_multiplier / 2.0).max(1.0);
                    info!(provider = %self.provider, "breaker: half_open -> closed");
                }
            }
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::Open => {}
        }
    }

    async fn record_failure(&self, latency_ms: u64) {
        let mut inner = self.inner.lock().await;
        inner.samples.push(Sample {
            latency_ms,
            is_error: true,
        });
        inner.last_failure = Some(self.time.instant());
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.trip_count += 1;
                inner.backoff_multiplier = (inner.backoff_multiplier * 1.5).min(8.0);
                warn!(provider = %self.provider, "breaker: half_open -> open");
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                let (threshold_now, _) = self.adaptive(&inner);
                if inner.consecutive_failures >= threshold_now {
                    inner.state = BreakerState::Open;
                    inner.trip_count += 1;
                    inner.backoff_multiplier = (inner.backoff_multiplier * 1.5).min(8.0);
                    warn!(provider = %self.provider, threshold = threshold_now, "breaker: closed -> open");
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Runs `f` under the breaker's gate. `f` reports its own failures as `Err(String)`; the
    /// breaker measures latency via its injected clock and records the outcome.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        self.guard().await?;
        let start = self.time.instant();
        let result = f().await;
        let latency_ms = self.time.instant().duration_since(start).as_millis() as u64;
        match result {
            Ok(value) => {
                self.record_success(latency_ms).await;
                Ok(value)
            }
            Err(reason) => {
                self.record_failure(latency_ms).await;
                debug!(provider = %self.provider, %reason, "breaker recorded failure");
                Err(BreakerError::CallFailed(reason))
            }
        }
    }

    /// As [`Self::call`], but if the breaker refuses the call outright (no probe window open)
    /// `fallback` is invoked instead and its result becomes the effective result.
    pub async fn call_with_fallback<F, Fut, T, Fb, FbFut>(
        &self,
        f: F,
        fallback: Fb,
    ) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
        Fb: FnOnce() -> FbFut,
        FbFut: std::future::Future<Output = T>,
    {
        if self.guard().await.is_err() {
            return Ok(fallback().await);
        }
        self.call(f).await
    }

    /// Point-in-time snapshot for diagnostics and the Health Monitor.
    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        let (threshold_now, timeout_now_ms) = self.adaptive(&inner);
        BreakerSnapshot {
            provider: self.provider.clone(),
            state: inner.state,
            trip_count: inner.trip_count,
            backoff_multiplier: inner.backoff_multiplier,
            threshold_now,
            timeout_now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_provider::test_time_provider;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "deepseek",
            BreakerConfig::testing(),
            test_time_provider(),
        )
    }

    #[tokio::test]
    async fn trips_after_threshold_failures() {
        let cb = breaker();
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom".to_string()) }).await;
        }
        let snap = cb.snapshot().await;
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.trip_count, 1);
    }

    #[tokio::test]
    async fn refuses_calls_while_open() {
        let cb = breaker();
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom".to_string()) }).await;
        }
        let err = cb.call(|| async { Ok::<_, String>(()) }).await.unwrap_err();
        assert!(matches!(err, BreakerError::CircuitOpen { .. }));
    }

    #[tokio::test]
    async fn recovers_through_half_open_after_cooldown() {
        let cb = breaker();
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom".to_string()) }).await;
        }
        // base_timeout_ms=100, backoff=1.5 after the first trip -> 150ms cooldown.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        for _ in 0..3 {
            cb.call(|| async { Ok::<_, String>(()) }).await.unwrap();
        }
        let snap = cb.snapshot().await;
        assert_eq!(snap.state, BreakerState::Closed);
        assert!((snap.backoff_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_and_increases_backoff() {
        let cb = breaker();
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom".to_string()) }).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let _ = cb.call(|| async { Err::<(), _>("still broken".to_string()) }).await;

        let snap = cb.snapshot().await;
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.trip_count, 2);
        assert!((snap.backoff_multiplier - 2.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fallback_invoked_while_open() {
        let cb = breaker();
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom".to_string()) }).await;
        }
        let value = cb
            .call_with_fallback(
                || async { Ok::<_, String>("primary") },
                || async { "fallback" },
            )
            .await
            .unwrap();
        assert_eq!(value, "fallback");
    }

    #[tokio::test]
    async fn backoff_never_exceeds_cap() {
        let cb = breaker();
        for _ in 0..20 {
            let _ = cb.call(|| async { Err::<(), _>("boom".to_string()) }).await;
            tokio::time::sleep(std::time::Duration::from_millis(900)).await;
        }
        let snap = cb.snapshot().await;
        assert!(snap.backoff_multiplier <= 8.0);
    }
}
