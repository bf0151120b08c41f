//! Agent Router (spec §4.2): channel selection, key lease, breaker-gated provider calls.

pub mod config;
pub mod domain_types;
pub mod endpoints;
pub mod http_client;
pub mod query;
pub mod rate_limiter;
pub mod router;
pub mod traits;

pub use config::{DefaultTimeoutSecs, RetryDelayMs, RouterConfig, RouterConfigError, ToolCallBudget};
pub use domain_types::{
    AgentRequest, AgentResponse, Channel, ExtraKwargs, PromptMaxLength, RequestContext,
    TokenUsage, TRUNCATION_NOTICE,
};
pub use http_client::ReqwestHttpClient;
pub use query::{query, QueryOptions, QueryResult};
pub use rate_limiter::{AgentRateLimiter, RateLimitConfig, RateLimitResult};
pub use router::RouterImpl;
pub use traits::{
    HttpClient, OutputValidationVerdict, OutputValidator, PromptGuard, PromptGuardVerdict,
    ResponseCache, Router, RouterError, ToolBridge,
};
