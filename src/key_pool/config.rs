//! Configuration for the API-Key Pool Manager

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Consecutive failures after which a key is quarantined (`unhealthy`).
#[nutype(
    validate(greater_or_equal = 2, less_or_equal = 20),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 3
)]
pub struct UnhealthyThreshold(u32);

/// Seconds an `unhealthy` key must sit idle before the reconciler restores it to `unknown`.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 86_400),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 60
)]
pub struct QuarantineCooldownSecs(u64);

/// Seconds between reconciler sweeps.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 3600),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 30
)]
pub struct ReconcileIntervalSecs(u64);

/// Errors raised while validating a `KeyPoolConfig`.
#[derive(Debug, Error)]
pub enum KeyPoolConfigError {
    #[error("invalid key pool configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Tunables for one `KeyPoolImpl` instance, shared across every provider it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPoolConfig {
    pub unhealthy_threshold: UnhealthyThreshold,
    pub quarantine_cooldown_secs: QuarantineCooldownSecs,
    pub reconcile_interval_secs: ReconcileIntervalSecs,
}

impl KeyPoolConfig {
    /// Sensitive-to-failure preset for local development: one bad response quarantines.
    #[must_use]
    pub fn development() -> Self {
        Self {
            unhealthy_threshold: UnhealthyThreshold::try_new(2).unwrap(),
            quarantine_cooldown_secs: QuarantineCooldownSecs::try_new(15).unwrap(),
            reconcile_interval_secs: ReconcileIntervalSecs::try_new(10).unwrap(),
        }
    }

    /// Default production tolerances matching §4.1's defaults (C=3).
    #[must_use]
    pub fn production() -> Self {
        Self {
            unhealthy_threshold: UnhealthyThreshold::try_new(3).unwrap(),
            quarantine_cooldown_secs: QuarantineCooldownSecs::try_new(60).unwrap(),
            reconcile_interval_secs: ReconcileIntervalSecs::try_new(30).unwrap(),
        }
    }

    /// Fast cooldowns so tests don't need to sleep for real.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            unhealthy_threshold: UnhealthyThreshold::try_new(2).unwrap(),
            quarantine_cooldown_secs: QuarantineCooldownSecs::try_new(1).unwrap(),
            reconcile_interval_secs: ReconcileIntervalSecs::try_new(1).unwrap(),
        }
    }

    /// Validates cross-field invariants beyond what the newtypes already enforce.
    pub fn validate(&self) -> Result<(), KeyPoolConfigError> {
        if self.reconcile_interval_secs.into_inner() > self.quarantine_cooldown_secs.into_inner() {
            return Err(KeyPoolConfigError::Invalid {
                field: "reconcile_interval_secs".to_string(),
                reason: "must not exceed quarantine_cooldown_secs, or quarantined keys sit \
                         idle past their own cooldown between sweeps"
                    .to_string(),
            });
        }
        Ok(())
    }
}

impl Default for KeyPoolConfig {
    fn default() -> Self {
        Self::production()
    }
}
