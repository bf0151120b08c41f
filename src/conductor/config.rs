//! Configuration for the Agent-to-Agent Conductor

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Loop-detection TTL and the conversation-cache retention window share this value in the
/// original; kept aligned here (spec §9 Open Question #2).
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, TryFrom, Into),
    default = 1800
)]
pub struct MaxConversationAgeSecs(u64);

/// Tunables for the conductor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConductorConfig {
    pub max_conversation_age_secs: MaxConversationAgeSecs,
    /// How many of the most recent messages the in-memory conversation cache retains per
    /// conversation (spec §4.5's "conversation cache" in §5).
    pub conversation_cache_size: usize,
    pub default_max_turns: u32,
}

impl ConductorConfig {
    /// Shorter conversation lifetime and fewer retained messages, convenient for local runs.
    #[must_use]
    pub fn development() -> Self {
        Self {
            max_conversation_age_secs: MaxConversationAgeSecs::try_new(300).unwrap(),
            conversation_cache_size: 20,
            default_max_turns: 5,
        }
    }

    #[must_use]
    pub fn production() -> Self {
        Self {
            max_conversation_age_secs: MaxConversationAgeSecs::try_new(1800).unwrap(),
            conversation_cache_size: 50,
            default_max_turns: 10,
        }
    }

    #[must_use]
    pub fn testing() -> Self {
        Self {
            max_conversation_age_secs: MaxConversationAgeSecs::try_new(5).unwrap(),
            conversation_cache_size: 50,
            default_max_turns: 10,
        }
    }
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self::production()
    }
}
