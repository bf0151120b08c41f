//! Redis-backed `StreamStore` for multi-node deployments
//!
//! Grounded on `original_source/backend/scaling/redis_consumer_groups.py`'s
//! `RedisConsumerGroup`: one Redis stream per logical stream name, a consumer group created
//! (idempotently, `XGROUP CREATE ... MKSTREAM`) on first use, `XREADGROUP`/`XACK`/`XCLAIM` for
//! delivery, and a sibling `<stream>:dlq` stream for exhausted retries.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use super::domain_types::{DeadLetterEntry, EntryId, StreamEntry};
use super::traits::{DispatcherError, RetryOutcome, StreamStore};

/// `StreamStore` backed by Redis Streams, shared across every worker process in a deployment.
pub struct RedisStreamStore {
    conn: ConnectionManager,
}

impl RedisStreamStore {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), DispatcherError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(DispatcherError::Backend(e.to_string())),
        }
    }

    fn entry_from_fields(entry_id: &str, fields: Vec<(String, String)>) -> StreamEntry {
        let map: std::collections::HashMap<_, _> = fields.into_iter().collect();
        StreamEntry {
            entry_id: EntryId(entry_id.to_string()),
            task_type: map.get("task_type").cloned().unwrap_or_default(),
            payload: map
                .get("task_data")
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or(serde_json::Value::Null),
            priority: map
                .get("priority")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            created_at: map
                .get("created_at")
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms))
                .unwrap_or_else(Utc::now),
            retry_count: map
                .get("retry_count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn append(
        &self,
        stream: &str,
        task_type: &str,
        payload: serde_json::Value,
        priority: i64,
    ) -> Result<EntryId, DispatcherError> {
        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(
                stream,
                "*",
                &[
                    ("task_type", task_type.to_string()),
                    ("task_data", payload.to_string()),
                    ("priority", priority.to_string()),
                    ("created_at", Utc::now().timestamp_millis().to_string()),
                    ("retry_count", "0".to_string()),
                ],
            )
            .await
            .map_err(|e| DispatcherError::Backend(e.to_string()))?;
        debug!(stream, entry_id = %id, "appended redis stream entry");
        Ok(EntryId(id))
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>, DispatcherError> {
        self.ensure_group(stream, group).await?;
        let mut conn = self.conn.clone();

        let reply: redis::streams::StreamReadReply = conn
            .xread_options(
                &[stream],
                &[">"],
                &redis::streams::StreamReadOptions::default()
                    .group(group, consumer)
                    .count(count)
                    .block(block_ms as usize),
            )
            .await
            .map_err(|e| DispatcherError::Backend(e.to_string()))?;

        let mut out = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                let fields = id
                    .map
                    .into_iter()
                    .filter_map(|(k, v)| redis::from_redis_value::<String>(&v).ok().map(|v| (k, v)))
                    .collect();
                out.push(Self::entry_from_fields(&id.id, fields));
            }
        }
        Ok(out)
    }

    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        entry_id: &EntryId,
    ) -> Result<(), DispatcherError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(stream, group, &[entry_id.0.as_str()])
            .await
            .map_err(|e| DispatcherError::Backend(e.to_string()))?;
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
        let mut conn = self.conn.clone();

        let ids: Vec<String> = if entry_ids.is_empty() {
            let pending: redis::streams::StreamPendingCountReply = conn
                .xpending_count(stream, group, "-", "+", 100)
                .await
                .map_err(|e| DispatcherError::Backend(e.to_string()))?;
            pending
                .ids
                .into_iter()
                .filter(|p| p.idle as u64 >= min_idle_ms)
                .map(|p| p.id)
                .collect()
        } else {
            entry_ids.iter().map(|e| e.0.clone()).collect()
        };

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let reply: redis::streams::StreamClaimReply = conn
            .xclaim(stream, group, consumer, min_idle_ms as usize, &ids)
            .await
            .map_err(|e| DispatcherError::Backend(e.to_string()))?;

        let mut out = Vec::new();
        for id in reply.ids {
            let fields = id
                .map
                .into_iter()
                .filter_map(|(k, v)| redis::from_redis_value::<String>(&v).ok().map(|v| (k, v)))
                .collect();
            warn!(stream, group, entry_id = %id.id, to = consumer, "claimed pending entry");
            out.push(Self::entry_from_fields(&id.id, fields));
        }
        Ok(out)
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
            let mut conn = self.conn.clone();
            let dlq = format!("{stream}:dlq");
            let _: String = conn
                .xadd(
                    &dlq,
                    "*",
                    &[
                        ("original_task_id", original_id.0.clone()),
                        ("task_type", entry.task_type.clone()),
                        ("task_data", entry.payload.to_string()),
                        ("failure_reason", failure_reason.to_string()),
                        ("failed_at", Utc::now().to_rfc3339()),
                        ("retry_count", entry.retry_count.to_string()),
                    ],
                )
                .await
                .map_err(|e| DispatcherError::Backend(e.to_string()))?;
            return Ok(RetryOutcome::DeadLettered);
        }

        let new_id = self
            .append(stream, &entry.task_type, entry.payload, entry.priority)
            .await?;
        Ok(RetryOutcome::Requeued(new_id))
    }

    async fn range(&self, stream: &str) -> Result<Vec<StreamEntry>, DispatcherError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, Vec<(String, String)>)> = conn
            .xrange_all(stream)
            .await
            .map_err(|e| DispatcherError::Backend(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|(id, fields)| Self::entry_from_fields(&id, fields))
            .collect())
    }

    async fn dead_letters(&self, stream: &str) -> Result<Vec<DeadLetterEntry>, DispatcherError> {
        let mut conn = self.conn.clone();
        let dlq = format!("{stream}:dlq");
        let entries: Vec<(String, Vec<(String, String)>)> = conn
            .xrange_all(&dlq)
            .await
            .map_err(|e| DispatcherError::Backend(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|(id, fields)| {
                let map: std::collections::HashMap<_, _> = fields.into_iter().collect();
                DeadLetterEntry {
                    original_task_id: EntryId(
                        map.get("original_task_id").cloned().unwrap_or(id),
                    ),
                    task_type: map.get("task_type").cloned().unwrap_or_default(),
                    task_data: map
                        .get("task_data")
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or(serde_json::Value::Null),
                    failure_reason: map.get("failure_reason").cloned().unwrap_or_default(),
                    failed_at: map
                        .get("failed_at")
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                    retry_count: map
                        .get("retry_count")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                }
            })
            .collect())
    }
}
