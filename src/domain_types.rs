//! Shared domain types used across subsystem boundaries
//!
//! Identifiers and value types that more than one of `key_pool`, `breaker`, `router`,
//! `dispatcher`, and `conductor` need to agree on live here to avoid duplicate, incompatible
//! definitions at each seam.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The external LLM-backed service a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// DeepSeek chat/completion API.
    DeepSeek,
    /// Perplexity search-augmented API.
    Perplexity,
    /// Qwen chat API.
    Qwen,
    /// OpenAI API.
    OpenAi,
    /// Anthropic API.
    Anthropic,
    /// Locally hosted Ollama instance.
    Ollama,
}

impl Provider {
    /// Stable lowercase identifier, used as a rate-limiter/breaker/metrics key.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::DeepSeek => "deepseek",
            Provider::Perplexity => "perplexity",
            Provider::Qwen => "qwen",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied or synthesized correlation id, threaded through logs, outbound calls,
/// and telemetry records.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Synthesizes a fresh correlation id for a caller that didn't supply one.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Kind of work a request or task represents, free-form but conventionally one of
/// `chat`, `search`, `backtest`, `validation`.
#[nutype(
    validate(len_char_min = 1, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct TaskType(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_str() {
        for p in [
            Provider::DeepSeek,
            Provider::Perplexity,
            Provider::Qwen,
            Provider::OpenAi,
            Provider::Anthropic,
            Provider::Ollama,
        ] {
            assert!(!p.as_str().is_empty());
            assert_eq!(p.to_string(), p.as_str());
        }
    }

    #[test]
    fn correlation_id_generate_is_random() {
        assert_ne!(CorrelationId::generate(), CorrelationId::generate());
    }

    #[test]
    fn task_type_rejects_empty() {
        assert!(TaskType::try_new(String::new()).is_err());
        assert!(TaskType::try_new("chat".to_string()).is_ok());
    }
}
