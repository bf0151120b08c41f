//! Configuration for one circuit breaker instance

use serde::{Deserialize, Serialize};

/// Base tunables for a breaker before any adaptive adjustment or backoff is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures (in `closed`) before tripping to `open`.
    pub base_threshold: u32,
    /// Cool-down, in milliseconds, before an `open` breaker allows a half-open probe.
    pub base_timeout_ms: u64,
    /// Capacity of the sliding latency/error sample window (spec default 100).
    pub sample_window_capacity: usize,
}

impl BreakerConfig {
    #[must_use]
    pub fn development() -> Self {
        Self {
            base_threshold: 2,
            base_timeout_ms: 2_000,
            sample_window_capacity: 50,
        }
    }

    #[must_use]
    pub fn production() -> Self {
        Self {
            base_threshold: 3,
            base_timeout_ms: 30_000,
            sample_window_capacity: 100,
        }
    }

    #[must_use]
    pub fn testing() -> Self {
        Self {
            base_threshold: 3,
            base_timeout_ms: 100,
            sample_window_capacity: 100,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::production()
    }
}
