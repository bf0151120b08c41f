//! Worker-capacity tracker and strategy-driven load balancer (spec §4.4.2)
//!
//! Grounded on `original_source/backend/scaling/load_balancer.py`'s `LoadBalancer` and
//! `AdaptiveLoadBalancer`. Per-worker counters are updated under a single balancer-wide
//! `Mutex`, matching §5's concurrency model ("assignment records are written to an external
//! fast store" — here that store is this process's own map, since the dispatcher owns worker
//! bookkeeping directly rather than delegating it to Redis).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::domain_types::{LoadBalancingStrategy, WorkerState};

struct Inner {
    workers: HashMap<String, WorkerState>,
    assignments: HashMap<String, String>,
}

/// Distributes tasks across registered workers under a configurable strategy.
pub struct LoadBalancer {
    strategy: std::sync::Mutex<LoadBalancingStrategy>,
    round_robin_index: AtomicUsize,
    inner: Mutex<Inner>,
}

impl LoadBalancer {
    #[must_use]
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy: std::sync::Mutex::new(strategy),
            round_robin_index: AtomicUsize::new(0),
            inner: Mutex::new(Inner {
                workers: HashMap::new(),
                assignments: HashMap::new(),
            }),
        }
    }

    pub async fn register_worker(&self, worker_id: impl Into<String>, weight: u32, max_concurrent: u32) {
        let worker_id = worker_id.into();
        let mut inner = self.inner.lock().await;
        inner
            .workers
            .insert(worker_id.clone(), WorkerState::new(worker_id, weight, max_concurrent));
    }

    pub async fn unregister_worker(&self, worker_id: &str) {
        self.inner.lock().await.workers.remove(worker_id);
    }

    pub async fn mark_healthy(&self, worker_id: &str, healthy: bool) {
        if let Some(w) = self.inner.lock().await.workers.get_mut(worker_id) {
            w.healthy = healthy;
        }
    }

    fn current_strategy(&self, workers: &HashMap<String, WorkerState>) -> LoadBalancingStrategy {
        let configured = *self.strategy.lock().unwrap();
        if configured != LoadBalancingStrategy::Adaptive {
            return configured;
        }
        if workers.is_empty() {
            return LoadBalancingStrategy::LeastLoaded;
        }
        let avg_load: f64 =
            workers.values().map(WorkerState::load_factor).sum::<f64>() / workers.len() as f64;
        if avg_load < 0.3 {
            LoadBalancingStrategy::RoundRobin
        } else if avg_load > 0.7 {
            LoadBalancingStrategy::LeastConnections
        } else {
            LoadBalancingStrategy::LeastLoaded
        }
    }

    /// Picks the next worker id under the current strategy, or `None` if no worker is
    /// available (healthy and under its `max_concurrent`).
    pub async fn next_worker(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        let available: Vec<&WorkerState> =
            inner.workers.values().filter(|w| w.can_accept()).collect();
        if available.is_empty() {
            warn!("load balancer: no available workers");
            return None;
        }

        let strategy = self.current_strategy(&inner.workers);
        let chosen: &WorkerState = match strategy {
            LoadBalancingStrategy::RoundRobin => {
                let i = self.round_robin_index.fetch_add(1, Ordering::Relaxed);
                available[i % available.len()]
            }
            LoadBalancingStrategy::LeastConnections => *available
                .iter()
                .min_by_key(|w| w.current_connections)
                .unwrap(),
            LoadBalancingStrategy::LeastLoaded => *available
                .iter()
                .min_by(|a, b| a.load_factor().partial_cmp(&b.load_factor()).unwrap())
                .unwrap(),
            LoadBalancingStrategy::WeightedRoundRobin => {
                let mut ring = Vec::new();
                for w in &available {
                    for _ in 0..w.weight {
                        ring.push(*w);
                    }
                }
                let i = self.round_robin_index.fetch_add(1, Ordering::Relaxed);
                ring[i % ring.len()]
            }
            LoadBalancingStrategy::Random => {
                *available.choose(&mut rand::thread_rng()).unwrap()
            }
            LoadBalancingStrategy::Adaptive => unreachable!("resolved above"),
        };
        Some(chosen.worker_id.clone())
    }

    /// Assigns `task_id` to the next chosen worker, recording the assignment.
    pub async fn assign_task(&self, task_id: &str) -> Option<String> {
        let worker_id = self.next_worker().await?;
        let mut inner = self.inner.lock().await;
        if let Some(w) = inner.workers.get_mut(&worker_id) {
            w.current_connections += 1;
            w.total_assigned += 1;
            w.last_assigned_at = Some(chrono::Utc::now());
        }
        inner.assignments.insert(task_id.to_string(), worker_id.clone());
        debug!(task_id, worker_id = %worker_id, "assigned task");
        Some(worker_id)
    }

    /// Marks `task_id` complete, decrementing its assigned worker's connection count.
    pub async fn complete_task(&self, task_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(worker_id) = inner.assignments.remove(task_id) {
            if let Some(w) = inner.workers.get_mut(&worker_id) {
                w.current_connections = w.current_connections.saturating_sub(1);
            }
        }
    }

    /// Point-in-time snapshot of every registered worker.
    pub async fn workers(&self) -> Vec<WorkerState> {
        self.inner.lock().await.workers.values().cloned().collect()
    }

    /// Bookkeeping-only rebalance (spec §9 Open Question: preserved as-is). Normalizes
    /// counters between overloaded (load > 0.8) and underloaded (load < 0.5) workers without
    /// re-enqueuing any task. Returns the number of counter moves made.
    pub async fn rebalance(&self) -> u32 {
        let mut inner = self.inner.lock().await;
        let overloaded: Vec<String> = inner
            .workers
            .values()
            .filter(|w| w.load_factor() > 0.8 && w.current_connections > 0)
            .map(|w| w.worker_id.clone())
            .collect();
        let mut moved = 0;

        for over_id in overloaded {
            loop {
                let still_over = inner
                    .workers
                    .get(&over_id)
                    .is_some_and(|w| w.load_factor() > 0.8);
                if !still_over {
                    break;
                }
                let under_id = inner
                    .workers
                    .values()
                    .filter(|w| w.load_factor() < 0.5 && w.can_accept())
                    .min_by(|a, b| a.load_factor().partial_cmp(&b.load_factor()).unwrap())
                    .map(|w| w.worker_id.clone());
                let Some(under_id) = under_id else { break };
                if under_id == over_id {
                    break;
                }

                if let Some(w) = inner.workers.get_mut(&over_id) {
                    w.current_connections = w.current_connections.saturating_sub(1);
                }
                if let Some(w) = inner.workers.get_mut(&under_id) {
                    w.current_connections += 1;
                }
                moved += 1;
            }
        }
        if moved > 0 {
            info!(moved, "rebalanced worker counters (bookkeeping only)");
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_robin_cycles_through_workers() {
        let lb = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);
        lb.register_worker("a", 1, 10).await;
        lb.register_worker("b", 1, 10).await;

        let first = lb.next_worker().await.unwrap();
        let second = lb.next_worker().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn least_loaded_prefers_idle_worker() {
        let lb = LoadBalancer::new(LoadBalancingStrategy::LeastLoaded);
        lb.register_worker("busy", 1, 10).await;
        lb.register_worker("idle", 1, 10).await;
        for _ in 0..5 {
            lb.assign_task("warmup").await;
            lb.complete_task("warmup").await;
        }
        let mut inner = lb.inner.lock().await;
        inner.workers.get_mut("busy").unwrap().current_connections = 8;
        drop(inner);

        let chosen = lb.next_worker().await.unwrap();
        assert_eq!(chosen, "idle");
    }

    #[tokio::test]
    async fn unhealthy_worker_excluded() {
        let lb = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);
        lb.register_worker("a", 1, 10).await;
        lb.mark_healthy("a", false).await;
        assert!(lb.next_worker().await.is_none());
    }

    #[tokio::test]
    async fn assign_and_complete_round_trip_counters() {
        let lb = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);
        lb.register_worker("a", 1, 10).await;
        let worker = lb.assign_task("t1").await.unwrap();
        assert_eq!(worker, "a");
        assert_eq!(lb.workers().await[0].current_connections, 1);

        lb.complete_task("t1").await;
        assert_eq!(lb.workers().await[0].current_connections, 0);
    }

    #[tokio::test]
    async fn weighted_round_robin_favors_higher_weight() {
        let lb = LoadBalancer::new(LoadBalancingStrategy::WeightedRoundRobin);
        lb.register_worker("heavy", 3, 10).await;
        lb.register_worker("light", 1, 10).await;

        let mut counts = std::collections::HashMap::new();
        for _ in 0..8 {
            let w = lb.next_worker().await.unwrap();
            *counts.entry(w).or_insert(0) += 1;
        }
        assert!(counts["heavy"] > counts["light"]);
    }
}
