//! Trait surface and errors for the Agent-to-Agent Conductor

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::domain_types::AgentMessage;

/// Failure modes specific to the conductor. Per-agent call failures are not represented here —
/// they surface as an `AgentMessage` of type `Error` (spec §4.5), not as a `Result::Err`.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("loop detected in conversation {conversation_id} at iteration {iteration}")]
    LoopDetected {
        conversation_id: String,
        iteration: u32,
    },

    #[error("loop detector backend error: {0}")]
    LoopDetectorBackend(String),

    #[error("rollback to backup failed: {0}")]
    RollbackFailed(String),
}

/// Conversation memory: consumed, not owned, by the conductor (spec §6's "Memory store
/// interface"). Implemented by [`crate::storage`].
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store_message(&self, conversation_id: &str, message: &AgentMessage);
    async fn get_conversation(&self, conversation_id: &str) -> Vec<AgentMessage>;
    async fn clear_conversation(&self, conversation_id: &str);
    /// Best-effort structured telemetry write (spec §4.5 "Telemetry"). Implementations must
    /// never propagate failures back to the caller — the conductor's call site already treats
    /// this as fire-and-forget.
    async fn record_event(&self, event_name: &str, payload: Value);
}
