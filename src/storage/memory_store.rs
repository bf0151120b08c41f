//! In-memory conversation store (spec §10.4: the `development()` preset and test default).

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::conductor::domain_types::AgentMessage;
use crate::conductor::traits::MemoryStore;

/// `DashMap`-backed [`MemoryStore`]. Events are not persisted anywhere durable; they are kept
/// only as a count for test assertions.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    conversations: DashMap<String, Mutex<Vec<AgentMessage>>>,
    events: DashMap<String, std::sync::atomic::AtomicU64>,
}

impl InMemoryMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn event_count(&self, event_name: &str) -> u64 {
        self.events
            .get(event_name)
            .map(|c| c.load(std::sync::atomic::Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn store_message(&self, conversation_id: &str, message: &AgentMessage) {
        let entry = self
            .conversations
            .entry(conversation_id.to_string())
            .or_default();
        entry.lock().await.push(message.clone());
    }

    async fn get_conversation(&self, conversation_id: &str) -> Vec<AgentMessage> {
        match self.conversations.get(conversation_id) {
            Some(entry) => entry.lock().await.clone(),
            None => Vec::new(),
        }
    }

    async fn clear_conversation(&self, conversation_id: &str) {
        self.conversations.remove(conversation_id);
    }

    async fn record_event(&self, event_name: &str, _payload: serde_json::Value) {
        self.events
            .entry(event_name.to_string())
            .or_insert_with(|| std::sync::atomic::AtomicU64::new(0))
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::domain_types::{MessageType, Participant};
    use crate::domain_types::Provider;

    #[tokio::test]
    async fn stores_and_clears_conversation() {
        let store = InMemoryMemoryStore::new();
        let message = AgentMessage::new(
            Participant::Orchestrator,
            Participant::Agent(Provider::DeepSeek),
            MessageType::Query,
            "hi",
            "conv-1",
            0,
            5,
        );
        store.store_message("conv-1", &message).await;
        assert_eq!(store.get_conversation("conv-1").await.len(), 1);

        store.clear_conversation("conv-1").await;
        assert!(store.get_conversation("conv-1").await.is_empty());
    }

    #[tokio::test]
    async fn record_event_counts_calls() {
        let store = InMemoryMemoryStore::new();
        store
            .record_event("route_completed", serde_json::json!({}))
            .await;
        store
            .record_event("route_completed", serde_json::json!({}))
            .await;
        assert_eq!(store.event_count("route_completed"), 2);
    }
}
