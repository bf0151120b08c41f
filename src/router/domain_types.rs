//! Domain types for the Agent Router

use std::collections::HashMap;

use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::domain_types::{CorrelationId, Provider, TaskType};
use crate::key_pool::ApiKeyIndex;

/// Which route a request takes to reach its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    /// Direct outbound HTTP to the provider.
    DirectApi,
    /// In-process dispatch to a local tool server.
    ToolBridge,
}

/// Extra named inputs to a request, replacing free-form keyword arguments (§9's design note).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraKwargs(pub HashMap<String, serde_json::Value>);

/// Per-request execution context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    /// Forces `DIRECT_API` when the request needs local file access.
    pub use_file_access: bool,
    /// True when the request originates from a tool-bridge handler.
    pub from_tool_bridge: bool,
    /// Overrides the provider's default timeout for this request only.
    pub timeout_override_secs: Option<u64>,
}

/// A single request to route to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub correlation_id: CorrelationId,
    pub provider: Provider,
    pub task_type: TaskType,
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub extra: ExtraKwargs,
    pub context: RequestContext,
}

/// Token usage reported by the provider, when present.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of routing one [`AgentRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub correlation_id: CorrelationId,
    pub success: bool,
    pub content: String,
    pub error: Option<String>,
    pub model: Option<String>,
    pub tokens_used: Option<TokenUsage>,
    pub cost_usd: Option<f64>,
    pub latency_ms: u64,
    pub api_key_index: Option<ApiKeyIndex>,
    pub channel: Channel,
    pub from_cache: bool,
}

impl AgentResponse {
    #[must_use]
    pub fn failure(
        correlation_id: CorrelationId,
        channel: Channel,
        error: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            correlation_id,
            success: false,
            content: String::new(),
            error: Some(error.into()),
            model: None,
            tokens_used: None,
            cost_usd: None,
            latency_ms,
            api_key_index: None,
            channel,
            from_cache: false,
        }
    }
}

/// Maximum prompt length, in characters, before truncation (spec §4.2(a), scenario 6).
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, TryFrom, Into),
    default = 100_000
)]
pub struct PromptMaxLength(usize);

/// Sentinel appended to a prompt truncated by [`PromptMaxLength`].
pub const TRUNCATION_NOTICE: &str = "[TRUNCATED]";
