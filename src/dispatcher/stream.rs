//! In-process `StreamStore`: `DashMap`-backed durable log with consumer groups
//!
//! Grounded on `original_source/backend/scaling/redis_consumer_groups.py`'s
//! `RedisConsumerGroup` semantics, reimplemented without an external broker for single-node
//! deployments and tests. Entry ordering within one stream is arrival order (spec §4.4.1);
//! each consumer group tracks its own delivery cursor and pending list independently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::domain_types::{DeadLetterEntry, EntryId, StreamEntry};
use super::traits::{DispatcherError, RetryOutcome, StreamStore};
use crate::time_provider::SharedTimeProvider;

struct GroupState {
    /// Index into `entries` of the next entry this group hasn't yet seen.
    cursor: usize,
    pending: std::collections::HashMap<EntryId, (StreamEntry, String, std::time::Instant)>,
}

struct StreamData {
    entries: Vec<StreamEntry>,
    groups: std::collections::HashMap<String, GroupState>,
    dead_letters: Vec<DeadLetterEntry>,
}

impl StreamData {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            groups: std::collections::HashMap::new(),
            dead_letters: Vec::new(),
        }
    }
}

/// Single-process implementation of [`StreamStore`], suitable for tests and single-node
/// deployments where Redis isn't available.
pub struct InMemoryStreamStore {
    streams: DashMap<String, Arc<Mutex<StreamData>>>,
    seq: AtomicU64,
    time: SharedTimeProvider,
}

impl InMemoryStreamStore {
    #[must_use]
    pub fn new(time: SharedTimeProvider) -> Self {
        Self {
            streams: DashMap::new(),
            seq: AtomicU64::new(0),
            time,
        }
    }

    fn next_id(&self) -> EntryId {
        let millis = Utc::now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        EntryId(format!("{millis}-{seq}"))
    }

    fn stream(&self, name: &str) -> Arc<Mutex<StreamData>> {
        self.streams
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(StreamData::new())))
            .clone()
    }
}

#[async_trait]
impl StreamStore for InMemoryStreamStore {
    async fn append(
        &self,
        stream: &str,
        task_type: &str,
        payload: serde_json::Value,
        priority: i64,
    ) -> Result<EntryId, DispatcherError> {
        let entry_id = self.next_id();
        let entry = StreamEntry {
            entry_id: entry_id.clone(),
            task_type: task_type.to_string(),
            payload,
            priority,
            created_at: Utc::now(),
            retry_count: 0,
        };
        let data = self.stream(stream);
        let mut data = data.lock().await;
        data.entries.push(entry);
        debug!(stream, entry_id = %entry_id, "appended stream entry");
        Ok(entry_id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>, DispatcherError> {
        let data = self.stream(stream);

        for attempt in 0..2 {
            let mut guard = data.lock().await;
            let state = guard
                .groups
                .entry(group.to_string())
                .or_insert_with(|| GroupState {
                    cursor: 0,
                    pending: std::collections::HashMap::new(),
                });

            let available = guard.entries.len().saturating_sub(state.cursor);
            if available > 0 {
                let take = available.min(count);
                let slice = guard.entries[state.cursor..state.cursor + take].to_vec();
                let state = guard.groups.get_mut(group).expect("just inserted");
                state.cursor += take;
                let now = self.time.instant();
                for e in &slice {
                    state
                        .pending
                        .insert(e.entry_id.clone(), (e.clone(), consumer.to_string(), now));
                }
                return Ok(slice);
            }
            drop(guard);

            if attempt == 0 && block_ms > 0 {
                self.time
                    .sleep(std::time::Duration::from_millis(block_ms))
                    .await;
            }
        }
        Ok(Vec::new())
    }

    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        entry_id: &EntryId,
    ) -> Result<(), DispatcherError> {
        let data = self.stream(stream);
        let mut guard = data.lock().await;
        let Some(state) = guard.groups.get_mut(group) else {
            return Err(DispatcherError::StreamNotFound(format!("{stream}:{group}")));
        };
        state.pending.remove(entry_id);
        Ok(())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        entry_ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>, DispatcherError> {
        let data = self.stream(stream);
        let mut guard = data.lock().await;
        let Some(state) = guard.groups.get_mut(group) else {
            return Ok(Vec::new());
        };

        let now = self.time.instant();
        let mut claimed = Vec::new();
        let candidates: Vec<EntryId> = if entry_ids.is_empty() {
            state.pending.keys().cloned().collect()
        } else {
            entry_ids.to_vec()
        };

        for id in candidates {
            if let Some((entry, owner, delivered_at)) = state.pending.get(&id).cloned() {
                let idle_ms = now.duration_since(delivered_at).as_millis() as u64;
                if idle_ms >= min_idle_ms {
                    state
                        .pending
                        .insert(id.clone(), (entry.clone(), consumer.to_string(), now));
                    warn!(stream, group, entry_id = %id, from = %owner, to = consumer, "claimed pending entry");
                    claimed.push(entry);
                }
            }
        }
        Ok(claimed)
    }

    async fn retry(
        &self,
        stream: &str,
        group: &str,
        mut entry: StreamEntry,
        max_retries: u32,
        failure_reason: &str,
    ) -> Result<RetryOutcome, DispatcherError> {
        let original_id = entry.entry_id.clone();
        self.acknowledge(stream, group, &original_id).await?;

        entry.retry_count += 1;
        if entry.retry_count > max_retries {
            let data = self.stream(stream);
            let mut guard = data.lock().await;
            guard.dead_letters.push(DeadLetterEntry {
                original_task_id: original_id,
                task_type: entry.task_type.clone(),
                task_data: entry.payload.clone(),
                failure_reason: failure_reason.to_string(),
                failed_at: Utc::now(),
                retry_count: entry.retry_count,
            });
            return Ok(RetryOutcome::DeadLettered);
        }

        let data = self.stream(stream);
        let mut guard = data.lock().await;
        let new_id = self.next_id();
        entry.entry_id = new_id.clone();
        guard.entries.push(entry);
        Ok(RetryOutcome::Requeued(new_id))
    }

    async fn range(&self, stream: &str) -> Result<Vec<StreamEntry>, DispatcherError> {
        let data = self.stream(stream);
        Ok(data.lock().await.entries.clone())
    }

    async fn dead_letters(&self, stream: &str) -> Result<Vec<DeadLetterEntry>, DispatcherError> {
        let data = self.stream(stream);
        Ok(data.lock().await.dead_letters.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_provider::test_time_provider;

    fn store() -> InMemoryStreamStore {
        InMemoryStreamStore::new(test_time_provider())
    }

    #[tokio::test]
    async fn delivers_then_acknowledges() {
        let s = store();
        s.append("tasks", "chat", serde_json::json!({"a": 1}), 0)
            .await
            .unwrap();
        let entries = s.read_group("tasks", "g1", "c1", 10, 0).await.unwrap();
        assert_eq!(entries.len(), 1);
        s.acknowledge("tasks", "g1", &entries[0].entry_id)
            .await
            .unwrap();

        let again = s.read_group("tasks", "g1", "c1", 10, 0).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn independent_groups_each_see_every_entry() {
        let s = store();
        s.append("tasks", "chat", serde_json::json!({}), 0)
            .await
            .unwrap();
        let g1 = s.read_group("tasks", "g1", "c1", 10, 0).await.unwrap();
        let g2 = s.read_group("tasks", "g2", "c1", 10, 0).await.unwrap();
        assert_eq!(g1.len(), 1);
        assert_eq!(g2.len(), 1);
    }

    #[tokio::test]
    async fn retry_to_dead_letter_after_max_retries() {
        let s = store();
        s.append("tasks", "chat", serde_json::json!({}), 0)
            .await
            .unwrap();
        let mut entry = s.read_group("tasks", "g1", "c1", 10, 0).await.unwrap().remove(0);

        for _ in 0..2 {
            let outcome = s
                .retry("tasks", "g1", entry.clone(), 2, "boom")
                .await
                .unwrap();
            match outcome {
                RetryOutcome::Requeued(_) => {
                    entry = s.read_group("tasks", "g1", "c1", 10, 0).await.unwrap().remove(0);
                }
                RetryOutcome::DeadLettered => panic!("should not dead-letter yet"),
            }
        }

        let outcome = s.retry("tasks", "g1", entry, 2, "boom").await.unwrap();
        assert_eq!(outcome, RetryOutcome::DeadLettered);

        let dlq = s.dead_letters("tasks").await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].failure_reason, "boom");

        let remaining = s.read_group("tasks", "g1", "c1", 10, 0).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn claim_transfers_idle_pending_entries() {
        let s = store();
        s.append("tasks", "chat", serde_json::json!({}), 0)
            .await
            .unwrap();
        s.read_group("tasks", "g1", "c1", 10, 0).await.unwrap();

        let claimed = s.claim("tasks", "g1", "c2", 0, &[]).await.unwrap();
        assert_eq!(claimed.len(), 1);
    }
}
