//! Redis-backed loop detection for multi-turn conversations (spec §4.5, §9 Open Question #2)
//!
//! Grounded on `original_source/backend/agents/agent_to_agent_communicator.py`'s
//! `_check_conversation_loop`. The original does a separate `EXISTS` then `SETEX`, leaving a
//! race window between two concurrent routes for the same `(conversation_id, iteration)`; this
//! implementation closes it with a single atomic `SET NX EX`, which is the only point where
//! this module's behavior deviates from the original (documented in `DESIGN.md`).

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use super::traits::ConductorError;

/// Marks a `(conversation_id, iteration)` pair as seen, failing if it was already marked.
#[async_trait]
pub trait LoopDetector: Send + Sync {
    async fn check_and_mark(
        &self,
        conversation_id: &str,
        iteration: u32,
        from_agent: &str,
    ) -> Result<(), ConductorError>;
}

/// Loop detector backed by Redis. TTL is `max_conversation_age`, preserved as-is per the Open
/// Question decision: a conversation that stalls longer than this TTL can silently re-enter the
/// loop — documented, not fixed, in `DESIGN.md`.
pub struct RedisLoopDetector {
    conn: redis::aio::ConnectionManager,
    ttl_secs: u64,
}

impl RedisLoopDetector {
    #[must_use]
    pub fn new(conn: redis::aio::ConnectionManager, ttl_secs: u64) -> Self {
        Self { conn, ttl_secs }
    }

    fn key(conversation_id: &str, iteration: u32) -> String {
        format!("agent-conv:{conversation_id}:{iteration}")
    }
}

#[async_trait]
impl LoopDetector for RedisLoopDetector {
    async fn check_and_mark(
        &self,
        conversation_id: &str,
        iteration: u32,
        from_agent: &str,
    ) -> Result<(), ConductorError> {
        let mut conn = self.conn.clone();
        let key = Self::key(conversation_id, iteration);
        let set: bool = conn
            .set_options(
                &key,
                from_agent,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(self.ttl_secs)),
            )
            .await
            .map_err(|e| ConductorError::LoopDetectorBackend(e.to_string()))?;

        if !set {
            warn!(conversation_id, iteration, "potential infinite loop detected");
            return Err(ConductorError::LoopDetected {
                conversation_id: conversation_id.to_string(),
                iteration,
            });
        }
        Ok(())
    }
}

/// In-process loop detector for tests and single-node deployments without Redis.
pub struct InMemoryLoopDetector {
    seen: dashmap::DashSet<String>,
}

impl InMemoryLoopDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: dashmap::DashSet::new(),
        }
    }
}

impl Default for InMemoryLoopDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoopDetector for InMemoryLoopDetector {
    async fn check_and_mark(
        &self,
        conversation_id: &str,
        iteration: u32,
        _from_agent: &str,
    ) -> Result<(), ConductorError> {
        let key = RedisLoopDetector::key(conversation_id, iteration);
        if !self.seen.insert(key) {
            return Err(ConductorError::LoopDetected {
                conversation_id: conversation_id.to_string(),
                iteration,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_mark_succeeds_second_fails() {
        let d = InMemoryLoopDetector::new();
        d.check_and_mark("conv-1", 1, "deepseek").await.unwrap();
        let err = d.check_and_mark("conv-1", 1, "deepseek").await.unwrap_err();
        assert!(matches!(err, ConductorError::LoopDetected { .. }));
    }

    #[tokio::test]
    async fn different_iterations_do_not_collide() {
        let d = InMemoryLoopDetector::new();
        d.check_and_mark("conv-1", 1, "deepseek").await.unwrap();
        d.check_and_mark("conv-1", 2, "deepseek").await.unwrap();
    }
}
