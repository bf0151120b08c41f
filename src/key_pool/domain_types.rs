//! Domain types for the API-Key Pool Manager

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::domain_types::Provider;

/// Position of a key within its provider's pool. Unique per provider for the pool's lifetime.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct ApiKeyIndex(usize);

/// Health state of a pooled key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyHealth {
    /// Serving traffic normally.
    Healthy,
    /// One failure away from quarantine; still eligible for lease.
    Degraded,
    /// Quarantined; excluded from lease until the reconciler restores it.
    Unhealthy,
    /// Freshly restored from quarantine, not yet re-tested.
    Unknown,
}

impl KeyHealth {
    /// Quarantined keys are never returned by `lease`.
    #[must_use]
    pub fn is_leaseable(self) -> bool {
        !matches!(self, KeyHealth::Unhealthy)
    }
}

/// Outcome of one outbound call, reported back to the pool via `record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call completed successfully.
    Success,
    /// The call failed for a recoverable reason (timeout, network, 5xx).
    Failure,
    /// The provider rejected credentials outright (401/403); quarantine immediately.
    AuthFailure,
}

/// Snapshot of one credential's accounting state. `secret` is never serialized and never
/// appears in a `Debug` or log line — only `index` identifies a key externally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub(crate) provider: Provider,
    pub(crate) index: ApiKeyIndex,
    #[serde(skip)]
    secret: String,
    pub(crate) health: KeyHealth,
    pub(crate) requests_total: u64,
    pub(crate) errors_total: u64,
    pub(crate) consecutive_failures: u32,
    pub(crate) last_used_at: Option<DateTime<Utc>>,
    pub(crate) last_error_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("provider", &self.provider)
            .field("index", &self.index)
            .field("secret", &"<redacted>")
            .field("health", &self.health)
            .field("requests_total", &self.requests_total)
            .field("errors_total", &self.errors_total)
            .finish_non_exhaustive()
    }
}

impl ApiKey {
    /// Creates a fresh, healthy key for `provider` at position `index` wrapping `secret`.
    #[must_use]
    pub fn new(provider: Provider, index: ApiKeyIndex, secret: String) -> Self {
        Self {
            provider,
            index,
            secret,
            health: KeyHealth::Healthy,
            requests_total: 0,
            errors_total: 0,
            consecutive_failures: 0,
            last_used_at: None,
            last_error_at: None,
        }
    }

    /// The opaque credential. Callers must not log this value.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    #[must_use]
    pub fn index(&self) -> ApiKeyIndex {
        self.index
    }

    #[must_use]
    pub fn health(&self) -> KeyHealth {
        self.health
    }

    #[must_use]
    pub fn requests_total(&self) -> u64 {
        self.requests_total
    }

    #[must_use]
    pub fn errors_total(&self) -> u64 {
        self.errors_total
    }
}
