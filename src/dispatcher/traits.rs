//! Trait surface and errors for the Distributed Task Dispatcher

use async_trait::async_trait;
use thiserror::Error;

use super::domain_types::{DeadLetterEntry, EntryId, Fields, StreamEntry};

/// Failure modes for dispatcher operations.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("stream {0} not found")]
    StreamNotFound(String),

    #[error("entry {0} not pending for consumer {1}")]
    NotPending(EntryId, String),

    #[error("backing store error: {0}")]
    Backend(String),

    #[error("no available worker")]
    NoAvailableWorker,
}

/// Durable append-only stream with consumer-group semantics (spec §4.4.1 and §6's stream-store
/// interface). One implementation runs fully in-process (tests, single-node dev); another is
/// backed by Redis streams for multi-node deployments.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Appends one entry, returning an entry-id ordered strictly after any prior append to
    /// `stream`.
    async fn append(
        &self,
        stream: &str,
        task_type: &str,
        payload: serde_json::Value,
        priority: i64,
    ) -> Result<EntryId, DispatcherError>;

    /// Reads up to `count` entries not yet delivered to `group`, blocking up to `block_ms`
    /// when the stream is empty. Each returned entry enters `consumer`'s pending list.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>, DispatcherError>;

    /// Removes `entry_id` from `consumer`'s pending list in `group`.
    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        entry_id: &EntryId,
    ) -> Result<(), DispatcherError>;

    /// Claims entries in `group` whose pending-idle time exceeds `min_idle_ms`, transferring
    /// ownership to `consumer`. An empty `entry_ids` claims every eligible pending entry.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        entry_ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>, DispatcherError>;

    /// Increments `retry_count` and re-appends the entry, acknowledging the original. Once
    /// `retry_count` exceeds `max_retries`, the entry is written to `<stream>:dlq` instead
    /// (spec §4.4.1).
    async fn retry(
        &self,
        stream: &str,
        group: &str,
        entry: StreamEntry,
        max_retries: u32,
        failure_reason: &str,
    ) -> Result<RetryOutcome, DispatcherError>;

    /// Arrival-ordered snapshot of every entry currently in `stream`.
    async fn range(&self, stream: &str) -> Result<Vec<StreamEntry>, DispatcherError>;

    /// Snapshot of `<stream>:dlq`.
    async fn dead_letters(&self, stream: &str) -> Result<Vec<DeadLetterEntry>, DispatcherError>;
}

/// What happened to an entry handed to [`StreamStore::retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-appended with an incremented `retry_count`.
    Requeued(EntryId),
    /// Retry budget exhausted; moved to the dead-letter stream.
    DeadLettered,
}

/// Generic key/value field encoding used by the external stream-store interface of spec §6,
/// for callers that work with the raw `Fields` shape instead of typed [`StreamEntry`]s.
#[async_trait]
pub trait RawStreamStore: Send + Sync {
    async fn append_fields(&self, stream: &str, fields: Fields) -> Result<EntryId, DispatcherError>;
}
