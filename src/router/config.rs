//! Configuration for the Agent Router

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain_types::PromptMaxLength;

/// Effective per-request deadline in seconds, absent any per-request override (§6
/// `AGENT_TIMEOUT_SECONDS`).
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 3600),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, TryFrom, Into),
    default = 300
)]
pub struct DefaultTimeoutSecs(u32);

/// Per-request cap on bridge tool invocations (§6 `TOOL_CALL_BUDGET`).
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 1000),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, TryFrom, Into),
    default = 10
)]
pub struct ToolCallBudget(u32);

/// Base delay, in milliseconds, for the single retry-on-transient-error (`retry_delay * attempt`).
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 60_000),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, TryFrom, Into),
    default = 250
)]
pub struct RetryDelayMs(u64);

#[derive(Debug, Error)]
pub enum RouterConfigError {
    #[error("invalid router configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Tunables shared by every request the Router handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub default_timeout_secs: DefaultTimeoutSecs,
    pub tool_call_budget: ToolCallBudget,
    pub retry_delay_ms: RetryDelayMs,
    pub prompt_max_length: PromptMaxLength,
    /// `FORCE_DIRECT_AGENT_API` (§6): disables bridge routing entirely when true.
    pub force_direct_api: bool,
}

impl RouterConfig {
    #[must_use]
    pub fn development() -> Self {
        Self {
            default_timeout_secs: DefaultTimeoutSecs::try_new(60).unwrap(),
            tool_call_budget: ToolCallBudget::try_new(10).unwrap(),
            retry_delay_ms: RetryDelayMs::try_new(100).unwrap(),
            prompt_max_length: PromptMaxLength::try_new(100_000).unwrap(),
            force_direct_api: true,
        }
    }

    #[must_use]
    pub fn production() -> Self {
        Self {
            default_timeout_secs: DefaultTimeoutSecs::try_new(300).unwrap(),
            tool_call_budget: ToolCallBudget::try_new(10).unwrap(),
            retry_delay_ms: RetryDelayMs::try_new(250).unwrap(),
            prompt_max_length: PromptMaxLength::try_new(100_000).unwrap(),
            force_direct_api: true,
        }
    }

    #[must_use]
    pub fn testing() -> Self {
        Self {
            default_timeout_secs: DefaultTimeoutSecs::try_new(5).unwrap(),
            tool_call_budget: ToolCallBudget::try_new(10).unwrap(),
            retry_delay_ms: RetryDelayMs::try_new(1).unwrap(),
            prompt_max_length: PromptMaxLength::try_new(100).unwrap(),
            force_direct_api: true,
        }
    }

    /// No cross-field invariants beyond the newtypes yet; kept for parity with the other
    /// subsystem configs and as a seam for future rules.
    pub fn validate(&self) -> Result<(), RouterConfigError> {
        Ok(())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::production()
    }
}
