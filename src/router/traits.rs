//! Interfaces for the Agent Router: the router contract itself, the HTTP-client capability it
//! is injected with (so tests can supply a deterministic fake per §9's design note), and the
//! cache/prompt-guard/output-validator interfaces it consumes but does not own.

use async_trait::async_trait;
use thiserror::Error;

use super::domain_types::{AgentRequest, AgentResponse, Channel};
use crate::breaker::BreakerError;
use crate::key_pool::KeyPoolError;

/// Errors surfaced by the Router, covering the taxonomy kinds of spec §7 relevant here.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    KeyPool(#[from] KeyPoolError),

    #[error(transparent)]
    Breaker(#[from] BreakerError),

    #[error("provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("auth failure for provider {provider}")]
    Auth { provider: String },

    #[error("tool not found: {0}")]
    ToolNotFound(String),
}

/// The HTTP call the Router issues for the `DIRECT_API` channel. Accepted as a constructor
/// parameter per §9's "monkeypatchable HTTP calls" note: production wires a `reqwest`-backed
/// implementation; tests inject a deterministic fake.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues one POST request with a JSON body and bearer-token auth, returning the HTTP
    /// status and response body. Never retries internally — the Router owns retry policy.
    async fn post_json(
        &self,
        url: &str,
        bearer_token: &str,
        body: serde_json::Value,
        timeout_ms: u64,
    ) -> Result<(u16, serde_json::Value), RouterError>;
}

/// The in-process tool-bridge dispatch target for the `TOOL_BRIDGE` channel.
#[async_trait]
pub trait ToolBridge: Send + Sync {
    async fn dispatch(&self, request: &AgentRequest) -> Result<AgentResponse, RouterError>;
}

/// Read-through response cache, keyed by a stable fingerprint (§6).
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, fingerprint: &str) -> Option<serde_json::Value>;
    async fn set(&self, fingerprint: &str, value: serde_json::Value, ttl_secs: Option<u64>);
    async fn clear_all(&self) -> usize;
}

/// Outcome of a prompt-guard check (§6, consumed not owned).
#[derive(Debug, Clone)]
pub struct PromptGuardVerdict {
    pub is_safe: bool,
    pub category: Option<String>,
    pub confidence: f64,
    pub sanitized_prompt: String,
    pub matched_patterns: Vec<String>,
}

#[async_trait]
pub trait PromptGuard: Send + Sync {
    async fn analyze(&self, prompt: &str) -> PromptGuardVerdict;
}

/// Outcome of an output-validator check (§6, consumed not owned).
#[derive(Debug, Clone)]
pub struct OutputValidationVerdict {
    pub is_valid: bool,
    pub sanitized_text: String,
    pub violations: Vec<String>,
}

#[async_trait]
pub trait OutputValidator: Send + Sync {
    async fn validate(&self, text: &str) -> OutputValidationVerdict;
}

/// Primary entry point exposed by the Router (§6's public surface).
#[async_trait]
pub trait Router: Send + Sync {
    /// Routes one request through exactly one channel, returning a structured response.
    async fn send_request(
        &self,
        request: AgentRequest,
        preferred_channel: Option<Channel>,
    ) -> AgentResponse;
}
