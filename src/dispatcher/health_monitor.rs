//! Per-service health monitoring and failover triggering (spec §4.4.4)
//!
//! Grounded on `original_source/backend/scaling/health_checks.py`'s `HealthCheck`/
//! `HealthMonitor`: each registered service is probed on its own interval/timeout, consecutive
//! failures accumulate per service, and a service crossing `failover_after` consecutive
//! `Unhealthy` results fires its failover handler exactly once per trip. Each service also owns
//! a small inner [`MicroBreaker`] (spec §10.6) so a monitor probing a dead dependency does not
//! itself hammer it with checks; this is independent of the adaptive `BreakerFabric` of §4.3
//! and never gates application traffic, only the monitor's own probing cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::config::HealthMonitorConfig;
use super::domain_types::{FailoverEvent, HealthCheckResult, HealthStatus};
use crate::time_provider::SharedTimeProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MicroBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Minimal closed/open/half-open gate guarding how often `run_check` actually invokes the
/// probe function, distinct from and much simpler than [`crate::breaker::CircuitBreaker`].
struct MicroBreaker {
    state: MicroBreakerState,
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

impl MicroBreaker {
    fn new(config: &HealthMonitorConfig) -> Self {
        Self {
            state: MicroBreakerState::Closed,
            failure_threshold: config.micro_breaker_failure_threshold,
            success_threshold: config.micro_breaker_success_threshold,
            timeout: Duration::from_secs(config.micro_breaker_timeout_secs),
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
        }
    }

    /// Whether the probe should actually run this cycle.
    fn allow(&mut self, now: Instant) -> bool {
        match self.state {
            MicroBreakerState::Closed | MicroBreakerState::HalfOpen => true,
            MicroBreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .is_some_and(|opened| now.duration_since(opened) >= self.timeout);
                if elapsed {
                    self.state = MicroBreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.state == MicroBreakerState::HalfOpen {
            self.consecutive_successes += 1;
            if self.consecutive_successes >= self.success_threshold {
                self.state = MicroBreakerState::Closed;
                self.consecutive_successes = 0;
                self.opened_at = None;
            }
        }
    }

    fn record_failure(&mut self, now: Instant) {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        if (self.state == MicroBreakerState::Closed
            && self.consecutive_failures >= self.failure_threshold)
            || self.state == MicroBreakerState::HalfOpen
        {
            self.state = MicroBreakerState::Open;
            self.opened_at = Some(now);
        }
    }
}

/// A single probe against a monitored service. Implementations wrap whatever transport is
/// appropriate (HTTP ping, TCP connect, provider-specific call).
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

/// Invoked once when a service's consecutive-failure count first reaches
/// [`HealthMonitorConfig::failover_after`].
#[async_trait]
pub trait FailoverHandler: Send + Sync {
    async fn on_failover(&self, event: &FailoverEvent);
}

struct ServiceEntry {
    check: Arc<dyn HealthCheck>,
    failover: Option<Arc<dyn FailoverHandler>>,
    consecutive_failures: u32,
    last_status: HealthStatus,
    tripped: bool,
    micro_breaker: MicroBreaker,
}

/// Registers and periodically runs health checks for a set of named services, tracking
/// consecutive failures and invoking failover handlers once the threshold is crossed.
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    services: DashMap<String, Mutex<ServiceEntry>>,
    results: DashMap<String, HealthCheckResult>,
    time: SharedTimeProvider,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(config: HealthMonitorConfig, time: SharedTimeProvider) -> Self {
        Self {
            config,
            services: DashMap::new(),
            results: DashMap::new(),
            time,
        }
    }

    pub fn register_health_check(
        &self,
        service_id: impl Into<String>,
        check: Arc<dyn HealthCheck>,
        failover: Option<Arc<dyn FailoverHandler>>,
    ) {
        let service_id = service_id.into();
        self.services.insert(
            service_id,
            Mutex::new(ServiceEntry {
                check,
                failover,
                consecutive_failures: 0,
                last_status: HealthStatus::Unknown,
                tripped: false,
                micro_breaker: MicroBreaker::new(&self.config),
            }),
        );
    }

    pub fn unregister_health_check(&self, service_id: &str) {
        self.services.remove(service_id);
        self.results.remove(service_id);
    }

    /// Runs the check for one service, updates its consecutive-failure count, and fires the
    /// failover handler the first time the threshold is crossed. Returns the cycle's result.
    pub async fn run_check(&self, service_id: &str) -> Option<HealthCheckResult> {
        let entry_lock = self.services.get(service_id)?;
        let mut entry = entry_lock.lock().await;

        let probe_start = self.time.instant();
        if !entry.micro_breaker.allow(probe_start) {
            warn!(service_id, "inner micro-breaker open, skipping probe");
            return self.results.get(service_id).map(|r| r.clone());
        }

        let start = self.time.instant();
        let outcome = entry.check.check().await;
        let elapsed_ms = self.time.instant().duration_since(start).as_millis() as u64;

        let (status, error_msg) = match outcome {
            Ok(()) => {
                entry.micro_breaker.record_success();
                (HealthStatus::Healthy, None)
            }
            Err(e) => {
                entry.micro_breaker.record_failure(self.time.instant());
                (HealthStatus::Unhealthy, Some(e))
            }
        };

        if status == HealthStatus::Healthy {
            if entry.consecutive_failures > 0 {
                info!(service_id, "health check recovered");
            }
            entry.consecutive_failures = 0;
            entry.tripped = false;
        } else {
            entry.consecutive_failures += 1;
            warn!(
                service_id,
                consecutive_failures = entry.consecutive_failures,
                error = error_msg.as_deref().unwrap_or(""),
                "health check failed"
            );
        }
        entry.last_status = status;

        let result = HealthCheckResult {
            service_id: service_id.to_string(),
            status,
            response_time_ms: elapsed_ms,
            error: error_msg,
            timestamp: chrono::Utc::now(),
            consecutive_failures: entry.consecutive_failures,
        };
        self.results.insert(service_id.to_string(), result.clone());

        if !entry.tripped && entry.consecutive_failures >= self.config.failover_after {
            entry.tripped = true;
            let event = FailoverEvent {
                service_id: service_id.to_string(),
                timestamp: chrono::Utc::now(),
                consecutive_failures: entry.consecutive_failures,
            };
            if let Some(handler) = entry.failover.clone() {
                drop(entry);
                error!(service_id, "triggering failover handler");
                handler.on_failover(&event).await;
            }
        }

        Some(result)
    }

    /// Runs checks for every registered service once.
    pub async fn run_all(&self) {
        let ids: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.run_check(&id).await;
        }
    }

    #[must_use]
    pub fn get_all_health_status(&self) -> HashMap<String, HealthCheckResult> {
        self.results
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn get_health_status(&self, service_id: &str) -> Option<HealthCheckResult> {
        self.results.get(service_id).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_provider::test_time_provider;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails;
    #[async_trait]
    impl HealthCheck for AlwaysFails {
        async fn check(&self) -> Result<(), String> {
            Err("connection refused".to_string())
        }
    }

    struct AlwaysOk;
    #[async_trait]
    impl HealthCheck for AlwaysOk {
        async fn check(&self) -> Result<(), String> {
            Ok(())
        }
    }

    struct CountingFailover(Arc<AtomicU32>);
    #[async_trait]
    impl FailoverHandler for CountingFailover {
        async fn on_failover(&self, _event: &FailoverEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(HealthMonitorConfig::default(), test_time_provider())
    }

    #[tokio::test]
    async fn healthy_check_reports_healthy() {
        let m = monitor();
        m.register_health_check("svc", Arc::new(AlwaysOk), None);
        let result = m.run_check("svc").await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn failover_fires_once_after_threshold() {
        let m = monitor();
        let calls = Arc::new(AtomicU32::new(0));
        m.register_health_check(
            "svc",
            Arc::new(AlwaysFails),
            Some(Arc::new(CountingFailover(calls.clone()))),
        );

        for _ in 0..5 {
            m.run_check("svc").await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn consecutive_failures_accumulate() {
        let m = monitor();
        m.register_health_check("svc", Arc::new(AlwaysFails), None);
        m.run_check("svc").await;
        m.run_check("svc").await;
        let status = m.get_health_status("svc").unwrap();
        assert_eq!(status.consecutive_failures, 2);
    }

    struct CountingFails(Arc<AtomicU32>);
    #[async_trait]
    impl HealthCheck for CountingFails {
        async fn check(&self) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        }
    }

    #[tokio::test]
    async fn micro_breaker_stops_probing_after_threshold() {
        let m = monitor();
        let probes = Arc::new(AtomicU32::new(0));
        m.register_health_check("svc", Arc::new(CountingFails(probes.clone())), None);

        // default micro_breaker_failure_threshold is 5: exactly 5 probes run and open it.
        for _ in 0..8 {
            m.run_check("svc").await;
        }
        assert_eq!(probes.load(Ordering::SeqCst), 5);
    }
}
