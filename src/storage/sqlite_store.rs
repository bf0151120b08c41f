//! `SQLite`-backed implementation of the conversation [`MemoryStore`] (spec §10.4).
//!
//! Table creation is handled by the migration system (see `migrations/`), not by this module —
//! matching the teacher's existing `conversation_storage.rs` convention. Writes are best-effort:
//! a failure here is swallowed per spec §9's "best-effort telemetry" note, but counted in
//! [`TELEMETRY_WRITE_FAILED_TOTAL`] so operators can alert on persistent failure.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::warn;

use super::mapping::{message_to_row, row_to_message, MessageRow};
use super::sql;
use super::TELEMETRY_WRITE_FAILED_TOTAL;
use crate::conductor::domain_types::AgentMessage;
use crate::conductor::traits::MemoryStore;
use crate::database::DatabaseConnection;

/// Conversation memory backed by a `sqlx` `SQLite` pool.
pub struct SqliteMemoryStore {
    conn: DatabaseConnection,
}

impl SqliteMemoryStore {
    #[must_use]
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn next_sequence(&self, conversation_id: &str) -> i64 {
        let max: i64 = sqlx::query_scalar(sql::MAX_SEQUENCE_FOR_CONVERSATION)
            .bind(conversation_id)
            .fetch_one(self.conn.pool())
            .await
            .unwrap_or(-1);
        max + 1
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn store_message(&self, conversation_id: &str, message: &AgentMessage) {
        let sequence = self.next_sequence(conversation_id).await;
        let row = message_to_row(message);
        let result = sqlx::query(sql::INSERT_MESSAGE)
            .bind(&row.message_id)
            .bind(&row.conversation_id)
            .bind(&row.from_agent)
            .bind(&row.to_agent)
            .bind(&row.message_type)
            .bind(&row.content)
            .bind(&row.context_json)
            .bind(row.iteration)
            .bind(row.max_iterations)
            .bind(row.confidence_score)
            .bind(&row.timestamp_utc)
            .bind(&row.metadata_json)
            .bind(sequence)
            .execute(self.conn.pool())
            .await;

        if let Err(e) = result {
            TELEMETRY_WRITE_FAILED_TOTAL.increment();
            warn!(conversation_id, error = %e, "failed to persist conversation message");
        }
    }

    async fn get_conversation(&self, conversation_id: &str) -> Vec<AgentMessage> {
        let rows = sqlx::query(sql::SELECT_CONVERSATION)
            .bind(conversation_id)
            .fetch_all(self.conn.pool())
            .await;

        let Ok(rows) = rows else {
            warn!(conversation_id, "failed to read conversation history");
            return Vec::new();
        };

        rows.into_iter()
            .filter_map(|r| {
                let row = MessageRow {
                    message_id: r.try_get("message_id").ok()?,
                    conversation_id: r.try_get("conversation_id").ok()?,
                    from_agent: r.try_get("from_agent").ok()?,
                    to_agent: r.try_get("to_agent").ok()?,
                    message_type: r.try_get("message_type").ok()?,
                    content: r.try_get("content").ok()?,
                    context_json: r.try_get("context_json").ok()?,
                    iteration: r.try_get("iteration").ok()?,
                    max_iterations: r.try_get("max_iterations").ok()?,
                    confidence_score: r.try_get("confidence_score").ok()?,
                    timestamp_utc: r.try_get("timestamp_utc").ok()?,
                    metadata_json: r.try_get("metadata_json").ok()?,
                };
                row_to_message(&row).ok()
            })
            .collect()
    }

    async fn clear_conversation(&self, conversation_id: &str) {
        if let Err(e) = sqlx::query(sql::DELETE_CONVERSATION)
            .bind(conversation_id)
            .execute(self.conn.pool())
            .await
        {
            TELEMETRY_WRITE_FAILED_TOTAL.increment();
            warn!(conversation_id, error = %e, "failed to clear conversation");
        }
    }

    async fn record_event(&self, event_name: &str, payload: serde_json::Value) {
        let payload_json = serde_json::to_string(&payload).unwrap_or_default();
        let recorded_at = Utc::now().to_rfc3339();
        if let Err(e) = sqlx::query(sql::INSERT_EVENT)
            .bind(event_name)
            .bind(&payload_json)
            .bind(&recorded_at)
            .execute(self.conn.pool())
            .await
        {
            TELEMETRY_WRITE_FAILED_TOTAL.increment();
            warn!(event_name, error = %e, "failed to record conductor telemetry event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::domain_types::{MessageType, Participant};
    use crate::database::{DatabaseConfig, DatabasePath};
    use crate::domain_types::Provider;
    use tempfile::TempDir;

    async fn store() -> (SqliteMemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = DatabasePath::new(dir.path().join("test.db")).unwrap();
        let config = DatabaseConfig::for_testing(path);
        let conn = DatabaseConnection::initialize(config).await.unwrap();
        (SqliteMemoryStore::new(conn), dir)
    }

    #[tokio::test]
    async fn stores_and_retrieves_in_order() {
        let (store, _dir) = store().await;
        for i in 0..3 {
            let message = AgentMessage::new(
                Participant::Orchestrator,
                Participant::Agent(Provider::DeepSeek),
                MessageType::Query,
                format!("turn {i}"),
                "conv-1",
                i,
                5,
            );
            store.store_message("conv-1", &message).await;
        }

        let history = store.get_conversation("conv-1").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "turn 0");
        assert_eq!(history[2].content, "turn 2");
    }

    #[tokio::test]
    async fn clear_conversation_removes_all_messages() {
        let (store, _dir) = store().await;
        let message = AgentMessage::new(
            Participant::Orchestrator,
            Participant::Agent(Provider::DeepSeek),
            MessageType::Query,
            "hi",
            "conv-2",
            0,
            5,
        );
        store.store_message("conv-2", &message).await;
        store.clear_conversation("conv-2").await;
        assert!(store.get_conversation("conv-2").await.is_empty());
    }

    #[tokio::test]
    async fn record_event_is_best_effort() {
        let (store, _dir) = store().await;
        store
            .record_event("route_completed", serde_json::json!({"ok": true}))
            .await;
    }
}
