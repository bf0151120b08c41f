//! Dynamic worker-scaling control loop (spec §4.4.3)
//!
//! Grounded on `original_source/backend/scaling/dynamic_worker_scaling.py`'s
//! `DynamicWorkerScaler`: cooldown-gated scale-up/scale-down decisions driven by queue depth,
//! worker CPU utilization, and system resource pressure. The loop itself only decides and
//! emits an audit event (spec §4.4.3 step 5) — provisioning one more/fewer worker process is
//! external.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::config::ScalingConfig;
use super::domain_types::{ScalingEvent, ScalingEventType, WorkerMetrics};
use super::traits::StreamStore;
use crate::time_provider::SharedTimeProvider;

/// Registry of live worker heartbeats/metrics, read by the [`Scaler`] each cycle.
pub struct WorkerRegistry {
    workers: DashMap<String, WorkerMetrics>,
}

impl WorkerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
        }
    }

    pub fn heartbeat(&self, metrics: WorkerMetrics) {
        self.workers.insert(metrics.worker_id.clone(), metrics);
    }

    /// Evicts workers whose heartbeat is older than `heartbeat_timeout_secs`; returns the
    /// evicted worker ids.
    pub fn evict_dead(&self, heartbeat_timeout_secs: u64) -> Vec<String> {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(heartbeat_timeout_secs as i64);
        let dead: Vec<String> = self
            .workers
            .iter()
            .filter(|e| e.value().last_heartbeat < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for id in &dead {
            self.workers.remove(id);
        }
        dead
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<WorkerMetrics> {
        self.workers.iter().map(|e| e.value().clone()).collect()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Control loop that decides scale-up/scale-down based on queue depth and worker metrics.
pub struct Scaler {
    config: ScalingConfig,
    registry: Arc<WorkerRegistry>,
    stream: Arc<dyn StreamStore>,
    time: SharedTimeProvider,
    last_scale_up_secs: AtomicI64,
    last_scale_down_secs: AtomicI64,
    epoch: std::time::Instant,
}

impl Scaler {
    #[must_use]
    pub fn new(
        config: ScalingConfig,
        registry: Arc<WorkerRegistry>,
        stream: Arc<dyn StreamStore>,
        time: SharedTimeProvider,
    ) -> Self {
        let epoch = time.instant();
        Self {
            config,
            registry,
            stream,
            time,
            last_scale_up_secs: AtomicI64::new(i64::MIN),
            last_scale_down_secs: AtomicI64::new(i64::MIN),
            epoch,
        }
    }

    fn now_secs(&self) -> i64 {
        self.time.instant().duration_since(self.epoch).as_secs() as i64
    }

    fn should_scale_up(&self, queue_depth: u64, active_workers: u32, system_cpu: f64, system_mem: f64) -> bool {
        let now = self.now_secs();
        if now - self.last_scale_up_secs.load(Ordering::Relaxed)
            < self.config.scale_up_cooldown_secs as i64
        {
            return false;
        }
        if active_workers >= self.config.max_workers {
            return false;
        }
        if queue_depth > self.config.target_queue_depth {
            return true;
        }
        let workers = self.registry.snapshot();
        if !workers.is_empty() {
            let busy = workers.iter().filter(|w| w.cpu_percent > 50.0).count();
            let utilization = busy as f64 / workers.len() as f64;
            if utilization > self.config.scale_up_threshold {
                return true;
            }
        }
        system_cpu > self.config.cpu_threshold || system_mem > self.config.memory_threshold
    }

    fn should_scale_down(&self, queue_depth: u64, active_workers: u32) -> bool {
        let now = self.now_secs();
        if now - self.last_scale_down_secs.load(Ordering::Relaxed)
            < self.config.scale_down_cooldown_secs as i64
        {
            return false;
        }
        if active_workers <= self.config.min_workers {
            return false;
        }
        if queue_depth as f64 > 0.5 * self.config.target_queue_depth as f64 {
            return false;
        }
        let workers = self.registry.snapshot();
        if workers.is_empty() {
            return false;
        }
        let busy = workers.iter().filter(|w| w.cpu_percent > 50.0).count();
        let utilization = busy as f64 / workers.len() as f64;
        utilization < self.config.scale_down_threshold
    }

    /// Runs one evaluation cycle: evicts dead workers, then decides and (if warranted) emits
    /// exactly one scale-up or scale-down event. Returns the decision made, if any.
    pub async fn run_once(
        &self,
        queue_depth: u64,
        system_cpu: f64,
        system_mem: f64,
    ) -> Option<ScalingEventType> {
        let evicted = self.registry.evict_dead(self.config.heartbeat_timeout_secs);
        for id in evicted {
            info!(worker_id = %id, "scaler: evicted dead worker");
        }

        let active = self.registry.active_count() as u32;

        if self.should_scale_up(queue_depth, active, system_cpu, system_mem) {
            self.last_scale_up_secs.store(self.now_secs(), Ordering::Relaxed);
            self.emit_event(ScalingEventType::ScaleUp, 1).await;
            return Some(ScalingEventType::ScaleUp);
        }

        if self.should_scale_down(queue_depth, active) {
            self.last_scale_down_secs
                .store(self.now_secs(), Ordering::Relaxed);
            self.emit_event(ScalingEventType::ScaleDown, 1).await;
            return Some(ScalingEventType::ScaleDown);
        }

        None
    }

    async fn emit_event(&self, event_type: ScalingEventType, num_workers: u32) {
        let event = ScalingEvent {
            event_type,
            num_workers,
            timestamp: chrono::Utc::now(),
            total_workers: self.registry.active_count() as u32,
        };
        let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
        let _ = self
            .stream
            .append("scaling:events", "scaling_event", payload, 0)
            .await;
        info!(?event_type, total_workers = event.total_workers, "scaler: emitted scaling event");
    }
}
