//! `CoreConfig`: the process-start composition root (spec §10.3).
//!
//! Generalizes the existing per-subsystem `production()`/`development()`/`testing()` preset
//! pattern (`KeyPoolConfig`, `BreakerConfig`, `RouterConfig`, `DispatcherConfig`,
//! `ConductorConfig`) one level up, and is the thing actually built from environment variables
//! at startup — analogous to how the prior binary wired its runtime config before serving.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::breaker::BreakerConfig;
use crate::conductor::ConductorConfig;
use crate::dispatcher::DispatcherConfig;
use crate::key_pool::KeyPoolConfig;
use crate::router::{DefaultTimeoutSecs, RouterConfig, ToolCallBudget};

/// `AGENT_MEMORY_BACKEND` (§6): which concrete `MemoryStore` the conductor is wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    Sqlite,
    Memory,
}

impl MemoryBackend {
    fn from_env_str(value: &str) -> Result<Self, CoreConfigError> {
        match value {
            "sqlite" => Ok(Self::Sqlite),
            "memory" | "file" => Ok(Self::Memory),
            other => Err(CoreConfigError::Invalid {
                field: "AGENT_MEMORY_BACKEND".to_string(),
                reason: format!("unrecognized backend {other:?}, expected sqlite|memory|file"),
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::Sqlite
    }
}

#[derive(Debug, Error)]
pub enum CoreConfigError {
    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Composition root for every subsystem's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub key_pool: KeyPoolConfig,
    pub breaker: BreakerConfig,
    pub router: RouterConfig,
    pub dispatcher: DispatcherConfig,
    pub conductor: ConductorConfig,
    pub memory_backend: MemoryBackend,
}

impl CoreConfig {
    #[must_use]
    pub fn development() -> Self {
        Self {
            key_pool: KeyPoolConfig::development(),
            breaker: BreakerConfig::development(),
            router: RouterConfig::development(),
            dispatcher: DispatcherConfig::development(),
            conductor: ConductorConfig::development(),
            memory_backend: MemoryBackend::Memory,
        }
    }

    #[must_use]
    pub fn production() -> Self {
        Self {
            key_pool: KeyPoolConfig::production(),
            breaker: BreakerConfig::production(),
            router: RouterConfig::production(),
            dispatcher: DispatcherConfig::production(),
            conductor: ConductorConfig::production(),
            memory_backend: MemoryBackend::Sqlite,
        }
    }

    #[must_use]
    pub fn testing() -> Self {
        Self {
            key_pool: KeyPoolConfig::testing(),
            breaker: BreakerConfig::testing(),
            router: RouterConfig::testing(),
            dispatcher: DispatcherConfig::testing(),
            conductor: ConductorConfig::testing(),
            memory_backend: MemoryBackend::Memory,
        }
    }

    /// Starts from [`Self::production`] and overlays the environment-tunable options of §6
    /// that are present. Absent variables keep the production default; malformed ones are
    /// reported rather than silently ignored.
    pub fn from_env() -> Result<Self, CoreConfigError> {
        let mut config = Self::production();

        if let Ok(value) = env::var("TOOL_CALL_BUDGET") {
            config.router.tool_call_budget =
                parse_env("TOOL_CALL_BUDGET", &value).and_then(|v: u32| {
                    ToolCallBudget::try_new(v).map_err(|e| CoreConfigError::Invalid {
                        field: "TOOL_CALL_BUDGET".to_string(),
                        reason: e.to_string(),
                    })
                })?;
        }

        if let Ok(value) = env::var("FORCE_DIRECT_AGENT_API") {
            config.router.force_direct_api = parse_bool("FORCE_DIRECT_AGENT_API", &value)?;
        }

        if let Ok(value) = env::var("AGENT_TIMEOUT_SECONDS") {
            config.router.default_timeout_secs =
                parse_env("AGENT_TIMEOUT_SECONDS", &value).and_then(|v: u32| {
                    DefaultTimeoutSecs::try_new(v).map_err(|e| CoreConfigError::Invalid {
                        field: "AGENT_TIMEOUT_SECONDS".to_string(),
                        reason: e.to_string(),
                    })
                })?;
        }

        if let Ok(value) = env::var("AGENT_MEMORY_BACKEND") {
            config.memory_backend = MemoryBackend::from_env_str(&value)?;
        }

        Ok(config)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::production()
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, CoreConfigError> {
    value.parse().map_err(|_| CoreConfigError::Invalid {
        field: field.to_string(),
        reason: format!("{value:?} is not a valid value"),
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, CoreConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreConfigError::Invalid {
            field: field.to_string(),
            reason: format!("{value:?} is not a recognized boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn presets_are_distinct() {
        let dev = CoreConfig::development();
        let prod = CoreConfig::production();
        assert_eq!(dev.memory_backend, MemoryBackend::Memory);
        assert_eq!(prod.memory_backend, MemoryBackend::Sqlite);
    }

    #[test]
    fn from_env_overlays_tool_call_budget() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("TOOL_CALL_BUDGET", "42");
        }
        let config = CoreConfig::from_env().unwrap();
        assert_eq!(config.router.tool_call_budget.into_inner(), 42);
        unsafe {
            env::remove_var("TOOL_CALL_BUDGET");
        }
    }

    #[test]
    fn from_env_rejects_malformed_timeout() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("AGENT_TIMEOUT_SECONDS", "not-a-number");
        }
        assert!(CoreConfig::from_env().is_err());
        unsafe {
            env::remove_var("AGENT_TIMEOUT_SECONDS");
        }
    }

    #[test]
    fn from_env_parses_force_direct_flag() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("FORCE_DIRECT_AGENT_API", "false");
        }
        let config = CoreConfig::from_env().unwrap();
        assert!(!config.router.force_direct_api);
        unsafe {
            env::remove_var("FORCE_DIRECT_AGENT_API");
        }
    }
}
