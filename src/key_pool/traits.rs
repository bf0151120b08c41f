//! Trait surface and errors for the API-Key Pool Manager

use async_trait::async_trait;
use thiserror::Error;

use super::domain_types::{ApiKey, ApiKeyIndex, CallOutcome};
use crate::domain_types::Provider;

/// Failure modes for key-pool operations.
#[derive(Debug, Error)]
pub enum KeyPoolError {
    /// Every key for the provider is currently quarantined.
    #[error("no healthy key available for provider {provider}")]
    NoHealthyKey { provider: Provider },

    /// `record` was called with a key index the pool never registered.
    #[error("unknown key index {index} for provider {provider}")]
    UnknownKey {
        provider: Provider,
        index: ApiKeyIndex,
    },

    /// The provider has no keys configured at all.
    #[error("provider {provider} has no keys configured")]
    ProviderNotConfigured { provider: Provider },
}

/// Lease-and-record contract for a pool of credentials backing one or more providers.
///
/// Implementations must guarantee lease exclusivity under concurrent callers (§8's
/// key-selection-exclusivity invariant): N concurrent `lease` calls for a provider with
/// healthy keys complete with N distinct leases, and each subsequent `record` is observed
/// exactly once.
#[async_trait]
pub trait KeyPool: Send + Sync {
    /// Leases one healthy key for `provider`. Never blocks: fails fast with `NoHealthyKey`
    /// when the provider's entire pool is quarantined.
    async fn lease(&self, provider: Provider) -> Result<ApiKey, KeyPoolError>;

    /// Records the outcome of a call made with the key at `index` for `provider`.
    ///
    /// A transient error while persisting the outcome is swallowed (best-effort accounting)
    /// per §4.1's failure semantics; this method itself still returns `Result` so an
    /// unrecognized key can be reported to the caller as a programming error.
    async fn record(
        &self,
        provider: Provider,
        index: ApiKeyIndex,
        outcome: CallOutcome,
    ) -> Result<(), KeyPoolError>;

    /// Restores any `unhealthy` key whose last error is older than the configured
    /// quarantine cooldown back to `unknown`, making it eligible for lease again.
    async fn reconcile(&self, provider: Provider);

    /// Snapshot of every key currently registered for `provider`, for diagnostics/health
    /// reporting. Returns an empty vec if the provider isn't configured.
    async fn snapshot(&self, provider: Provider) -> Vec<ApiKey>;
}
