//! Configuration for the Distributed Task Dispatcher

use nutype::nutype;
use serde::{Deserialize, Serialize};

use super::domain_types::LoadBalancingStrategy;

/// Maximum retry attempts before an entry is routed to the dead-letter stream.
#[nutype(
    validate(greater_or_equal = 0, less_or_equal = 100),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, TryFrom, Into),
    default = 3
)]
pub struct MaxRetries(u32);

/// Idle time, in milliseconds, before a pending entry becomes claimable by another consumer.
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, TryFrom, Into),
    default = 300_000
)]
pub struct MaxPendingTimeMs(u64);

/// Tunables for one durable stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub max_retries: MaxRetries,
    pub max_pending_time_ms: MaxPendingTimeMs,
}

impl StreamConfig {
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_retries: MaxRetries::try_new(3).unwrap(),
            max_pending_time_ms: MaxPendingTimeMs::try_new(300_000).unwrap(),
        }
    }

    #[must_use]
    pub fn testing() -> Self {
        Self {
            max_retries: MaxRetries::try_new(2).unwrap(),
            max_pending_time_ms: MaxPendingTimeMs::try_new(50).unwrap(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Tunables for the dynamic worker-scaling control loop (spec §3 "ScalingConfig").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub min_workers: u32,
    pub max_workers: u32,
    pub target_queue_depth: u64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub scale_up_cooldown_secs: u64,
    pub scale_down_cooldown_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub interval_secs: u64,
}

impl ScalingConfig {
    #[must_use]
    pub fn production() -> Self {
        Self {
            min_workers: 1,
            max_workers: 10,
            target_queue_depth: 100,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            scale_up_cooldown_secs: 60,
            scale_down_cooldown_secs: 300,
            heartbeat_timeout_secs: 30,
            interval_secs: 30,
        }
    }

    #[must_use]
    pub fn testing() -> Self {
        Self {
            min_workers: 1,
            max_workers: 4,
            target_queue_depth: 10,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            scale_up_cooldown_secs: 0,
            scale_down_cooldown_secs: 0,
            heartbeat_timeout_secs: 5,
            interval_secs: 1,
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Tunables for the health monitor (spec §4.4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    pub default_interval_secs: u64,
    pub default_timeout_secs: u64,
    /// Consecutive `unhealthy` results before a failover handler fires.
    pub failover_after: u32,
    /// Consecutive probe failures before the monitor's own inner micro-breaker opens and stops
    /// calling the check function (spec §4.4.4, §10.6).
    pub micro_breaker_failure_threshold: u32,
    /// Consecutive probe successes in half-open needed to close the inner micro-breaker.
    pub micro_breaker_success_threshold: u32,
    /// Cool-down before the inner micro-breaker allows another probe.
    pub micro_breaker_timeout_secs: u64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 30,
            default_timeout_secs: 10,
            failover_after: 3,
            micro_breaker_failure_threshold: 5,
            micro_breaker_success_threshold: 2,
            micro_breaker_timeout_secs: 60,
        }
    }
}

/// Load-balancer strategy selection, with the graceful unknown-value fallback of §4.4.2.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub strategy: LoadBalancingStrategy,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            strategy: LoadBalancingStrategy::LeastLoaded,
        }
    }
}

/// Composes every dispatcher sub-config into one unit (spec §10.3), the way `CoreConfig`
/// composes one of these per subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub stream: StreamConfig,
    pub scaling: ScalingConfig,
    pub health_monitor: HealthMonitorConfig,
    pub load_balancer: LoadBalancerConfig,
}

impl DispatcherConfig {
    #[must_use]
    pub fn development() -> Self {
        Self {
            stream: StreamConfig::testing(),
            scaling: ScalingConfig::testing(),
            health_monitor: HealthMonitorConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
        }
    }

    #[must_use]
    pub fn production() -> Self {
        Self {
            stream: StreamConfig::production(),
            scaling: ScalingConfig::production(),
            health_monitor: HealthMonitorConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
        }
    }

    #[must_use]
    pub fn testing() -> Self {
        Self {
            stream: StreamConfig::testing(),
            scaling: ScalingConfig::testing(),
            health_monitor: HealthMonitorConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::production()
    }
}
