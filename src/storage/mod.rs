//! Conversation memory store (spec §6 "Memory store interface", §10.4).
//!
//! Follows the functional-core/imperative-shell split the teacher crate already used for
//! agent/message storage: a pure `sql` module of query strings, a pure `mapping` module
//! converting rows ⇄ domain types, and a `SqliteMemoryStore` imperative shell that owns the
//! `SqlitePool` and performs I/O. An `InMemoryMemoryStore` variant backs the `development()`
//! config preset and tests.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod mapping;
pub mod memory_store;
pub mod sql;
pub mod sqlite_store;

pub use memory_store::InMemoryMemoryStore;
pub use sqlite_store::SqliteMemoryStore;

/// Counter for best-effort telemetry/event writes that failed, per spec §9's design note on
/// "best-effort telemetry that silently swallows errors": the swallowing behavior is kept, but
/// this surfaces a signal operators can alert on.
pub struct TelemetryWriteFailedCounter(AtomicU64);

impl TelemetryWriteFailedCounter {
    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Current count of failed best-effort writes since process start.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Process-wide counter, incremented by both store implementations.
pub static TELEMETRY_WRITE_FAILED_TOTAL: TelemetryWriteFailedCounter =
    TelemetryWriteFailedCounter(AtomicU64::new(0));
