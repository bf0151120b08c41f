//! Domain types for the Circuit Breaker Fabric

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Circuit breaker state (spec §4.3's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls run normally.
    Closed,
    /// Calls are refused (or delegated to a fallback) until the cool-down elapses.
    Open,
    /// A single probe window: calls run, but any failure reopens the breaker.
    HalfOpen,
}

/// One sample in the breaker's fixed-capacity sliding window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sample {
    pub(crate) latency_ms: u64,
    pub(crate) is_error: bool,
}

/// Fixed-capacity ring buffer of the last `capacity` call outcomes, backing the adaptive
/// threshold derivation of §4.3.
pub(crate) struct SampleWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }

    /// Fraction of samples flagged as errors, or 0.0 if the window is empty.
    pub(crate) fn error_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let errors = self.samples.iter().filter(|s| s.is_error).count();
        errors as f64 / self.samples.len() as f64
    }
}

/// A snapshot of one breaker's externally observable state, for diagnostics and the Health
/// Monitor's `get_all_health_status` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub provider: String,
    pub state: BreakerState,
    pub trip_count: u64,
    pub backoff_multiplier: f64,
    pub threshold_now: u32,
    pub timeout_now_ms: u64,
}
