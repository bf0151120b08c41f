//! In-process priority queue variant (spec §4.4.1)
//!
//! Grounded on `original_source/backend/scaling/redis_consumer_groups.py`'s
//! `TaskPriorityQueue`, reimplemented over a binary heap instead of a Redis sorted set: higher
//! priority is preferred, ties broken by insertion order (FIFO among equal priorities).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use tokio::sync::Mutex;

use super::domain_types::PriorityTask;

#[derive(Debug, Clone)]
struct HeapItem(PriorityTask);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.sequence == other.0.sequence
    }
}
impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; for ties, earlier sequence (FIFO) first. `BinaryHeap` is a
        // max-heap, so we invert sequence comparison to make the smaller sequence "greater".
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered store keyed by priority (descending), ties broken by insertion order.
pub struct TaskPriorityQueue {
    heap: Mutex<BinaryHeap<HeapItem>>,
    sequence: AtomicU64,
}

impl TaskPriorityQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn add(&self, task_id: impl Into<String>, data: serde_json::Value, priority: i64) {
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().await.push(HeapItem(PriorityTask {
            task_id: task_id.into(),
            data,
            priority,
            sequence,
        }));
    }

    /// Returns and removes the highest-priority task, or `None` if the queue is empty.
    pub async fn pop(&self) -> Option<PriorityTask> {
        self.heap.lock().await.pop().map(|item| item.0)
    }

    pub async fn size(&self) -> usize {
        self.heap.lock().await.len()
    }

    /// Highest-priority `n` tasks without removing them, highest first.
    pub async fn peek(&self, n: usize) -> Vec<PriorityTask> {
        let heap = self.heap.lock().await;
        let mut items: Vec<_> = heap.iter().cloned().collect();
        items.sort_by(|a, b| HeapItem(a.0.clone()).cmp(&HeapItem(b.0.clone())).reverse());
        items.into_iter().take(n).map(|i| i.0).collect()
    }
}

impl Default for TaskPriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
