//! Domain types for the Distributed Task Dispatcher

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one entry within a stream, ordered strictly after any prior entry-id in the
/// same stream (spec §4.4.1). The in-process store uses `<millis>-<seq>`, matching the shape
/// of a Redis stream ID so both backends can share callers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One append-only log record (spec §3 "Stream entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    pub entry_id: EntryId,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}

/// An entry delivered to a consumer, pending acknowledgment or claim.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub entry: StreamEntry,
    pub consumer: String,
    pub delivered_at: DateTime<Utc>,
}

/// A dead-lettered entry, written after `retry_count` exceeds `max_retries` (spec §6's
/// dead-letter stream format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub original_task_id: EntryId,
    pub task_type: String,
    pub task_data: serde_json::Value,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
    pub retry_count: u32,
}

/// Strategy a [`crate::dispatcher::load_balancer::LoadBalancer`] uses to pick the next worker
/// (spec §4.4.2). Unknown values fall back to `LeastLoaded` at the config layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    LeastConnections,
    LeastLoaded,
    WeightedRoundRobin,
    Random,
    Adaptive,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self::LeastLoaded
    }
}

impl std::str::FromStr for LoadBalancingStrategy {
    type Err = std::convert::Infallible;

    /// Unrecognized strategy names fall back to `LeastLoaded` (spec §4.4.2's "graceful
    /// fallback"), never an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "round_robin" => Self::RoundRobin,
            "least_connections" => Self::LeastConnections,
            "weighted_round_robin" => Self::WeightedRoundRobin,
            "random" => Self::Random,
            "adaptive" => Self::Adaptive,
            _ => Self::LeastLoaded,
        })
    }
}

/// Bookkeeping state for one worker (spec §3 "WorkerState").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub worker_id: String,
    pub weight: u32,
    pub max_concurrent: u32,
    pub current_connections: u32,
    pub total_assigned: u64,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub healthy: bool,
}

impl WorkerState {
    #[must_use]
    pub fn new(worker_id: impl Into<String>, weight: u32, max_concurrent: u32) -> Self {
        Self {
            worker_id: worker_id.into(),
            weight: weight.max(1),
            max_concurrent,
            current_connections: 0,
            total_assigned: 0,
            last_assigned_at: None,
            healthy: true,
        }
    }

    #[must_use]
    pub fn can_accept(&self) -> bool {
        self.healthy && self.current_connections < self.max_concurrent
    }

    #[must_use]
    pub fn load_factor(&self) -> f64 {
        if self.max_concurrent == 0 {
            return 1.0;
        }
        f64::from(self.current_connections) / f64::from(self.max_concurrent)
    }
}

/// Per-worker runtime metrics fed to the [`crate::dispatcher::scaler::Scaler`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub worker_id: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub tasks_processed: u64,
    pub tasks_failed: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub status: String,
}

/// Health status of a monitored service (spec §3 "HealthCheck").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Outcome of one health-check cycle for one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub service_id: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub consecutive_failures: u32,
}

/// An audited scaling decision (spec §6's scaling-event stream format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingEvent {
    pub event_type: ScalingEventType,
    pub num_workers: u32,
    pub timestamp: DateTime<Utc>,
    pub total_workers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingEventType {
    ScaleUp,
    ScaleDown,
}

/// A failover event emitted when a service trips to sustained `unhealthy` (spec §4.4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub service_id: String,
    pub timestamp: DateTime<Utc>,
    pub consecutive_failures: u32,
}

/// Fields carried by one priority-queue entry (spec §4.4.1's priority queue variant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityTask {
    pub task_id: String,
    pub data: serde_json::Value,
    pub priority: i64,
    pub sequence: u64,
}

/// Opaque field map carried on stream append, mirroring the external stream-store interface
/// of spec §6 (`append(stream, fields)`).
pub type Fields = HashMap<String, String>;
