//! `KeyPoolImpl`: round-robin-over-healthy-set lease with LRU tie-break
//!
//! The hot path (`lease`) takes a short-lived lock scoped to index advance and timestamp
//! writes only; the lock is released before the caller issues its outbound HTTP call, per
//! §5's Key Pool concurrency model. Per-provider state lives in its own `Mutex` so callers
//! against different providers never contend.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::config::KeyPoolConfig;
use super::domain_types::{ApiKey, ApiKeyIndex, CallOutcome, KeyHealth};
use super::traits::{KeyPool, KeyPoolError};
use crate::domain_types::Provider;

struct ProviderPool {
    keys: Mutex<Vec<ApiKey>>,
    /// Index of the next candidate to try in round-robin order.
    cursor: Mutex<usize>,
}

/// In-process implementation of the [`KeyPool`] trait.
///
/// Construct with [`KeyPoolImpl::new`], then seed each provider's keys with
/// [`KeyPoolImpl::register_keys`] before serving traffic.
pub struct KeyPoolImpl {
    config: KeyPoolConfig,
    providers: DashMap<Provider, ProviderPool>,
}

impl KeyPoolImpl {
    #[must_use]
    pub fn new(config: KeyPoolConfig) -> Self {
        Self {
            config,
            providers: DashMap::new(),
        }
    }

    /// Registers the credential set for `provider`, assigning each secret a stable index
    /// in the order given. Calling this twice for the same provider replaces its pool.
    pub fn register_keys(&self, provider: Provider, secrets: Vec<String>) {
        let keys = secrets
            .into_iter()
            .enumerate()
            .map(|(i, secret)| ApiKey::new(provider, ApiKeyIndex::new(i), secret))
            .collect();
        self.providers.insert(
            provider,
            ProviderPool {
                keys: Mutex::new(keys),
                cursor: Mutex::new(0),
            },
        );
    }
}

#[async_trait]
impl KeyPool for KeyPoolImpl {
    async fn lease(&self, provider: Provider) -> Result<ApiKey, KeyPoolError> {
        let pool = self
            .providers
            .get(&provider)
            .ok_or(KeyPoolError::ProviderNotConfigured { provider })?;

        let mut keys = pool.keys.lock().await;
        if keys.is_empty() {
            return Err(KeyPoolError::ProviderNotConfigured { provider });
        }

        let mut cursor = pool.cursor.lock().await;
        let n = keys.len();
        for step in 0..n {
            let i = (*cursor + step) % n;
            if keys[i].health.is_leaseable() {
                keys[i].last_used_at = Some(Utc::now());
                *cursor = (i + 1) % n;
                debug!(provider = %provider, index = %keys[i].index, "leased key");
                return Ok(keys[i].clone());
            }
        }

        warn!(provider = %provider, "no healthy key available");
        Err(KeyPoolError::NoHealthyKey { provider })
    }

    async fn record(
        &self,
        provider: Provider,
        index: ApiKeyIndex,
        outcome: CallOutcome,
    ) -> Result<(), KeyPoolError> {
        let pool = self
            .providers
            .get(&provider)
            .ok_or(KeyPoolError::ProviderNotConfigured { provider })?;
        let mut keys = pool.keys.lock().await;
        let key = keys
            .iter_mut()
            .find(|k| k.index == index)
            .ok_or(KeyPoolError::UnknownKey { provider, index })?;

        key.requests_total += 1;
        match outcome {
            CallOutcome::Success => {
                key.consecutive_failures = 0;
                if key.health == KeyHealth::Unhealthy || key.health == KeyHealth::Degraded {
                    key.health = KeyHealth::Healthy;
                }
            }
            CallOutcome::Failure => {
                key.errors_total += 1;
                key.consecutive_failures += 1;
                key.last_error_at = Some(Utc::now());
                let threshold = self.config.unhealthy_threshold.into_inner();
                if key.consecutive_failures >= threshold {
                    key.health = KeyHealth::Unhealthy;
                } else if key.consecutive_failures + 1 == threshold {
                    key.health = KeyHealth::Degraded;
                }
            }
            CallOutcome::AuthFailure => {
                key.errors_total += 1;
                key.last_error_at = Some(Utc::now());
                key.health = KeyHealth::Unhealthy;
            }
        }
        Ok(())
    }

    async fn reconcile(&self, provider: Provider) {
        let Some(pool) = self.providers.get(&provider) else {
            return;
        };
        let cooldown = chrono::Duration::seconds(self.config.quarantine_cooldown_secs.into_inner() as i64);
        let now = Utc::now();
        let mut keys = pool.keys.lock().await;
        for key in keys.iter_mut() {
            if key.health == KeyHealth::Unhealthy
                && key.last_error_at.is_some_and(|t| now - t >= cooldown)
            {
                key.health = KeyHealth::Unknown;
                debug!(provider = %provider, index = %key.index, "restored quarantined key");
            }
        }
    }

    async fn snapshot(&self, provider: Provider) -> Vec<ApiKey> {
        match self.providers.get(&provider) {
            Some(pool) => pool.keys.lock().await.clone(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(n: usize) -> KeyPoolImpl {
        let pool = KeyPoolImpl::new(KeyPoolConfig::testing());
        pool.register_keys(
            Provider::DeepSeek,
            (0..n).map(|i| format!("secret-{i}")).collect(),
        );
        pool
    }

    #[tokio::test]
    async fn round_robins_over_three_keys() {
        let pool = pool_with(3);
        let mut seen = Vec::new();
        for _ in 0..10 {
            let key = pool.lease(Provider::DeepSeek).await.unwrap();
            seen.push(key.index().into_inner());
            pool.record(Provider::DeepSeek, key.index(), CallOutcome::Success)
                .await
                .unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn quarantines_after_consecutive_failures() {
        let pool = pool_with(1);
        let idx = ApiKeyIndex::new(0);
        for _ in 0..2 {
            pool.record(Provider::DeepSeek, idx, CallOutcome::Failure)
                .await
                .unwrap();
        }
        let err = pool.lease(Provider::DeepSeek).await.unwrap_err();
        assert!(matches!(err, KeyPoolError::NoHealthyKey { .. }));
    }

    #[tokio::test]
    async fn auth_failure_quarantines_immediately() {
        let pool = pool_with(1);
        let idx = ApiKeyIndex::new(0);
        pool.record(Provider::DeepSeek, idx, CallOutcome::AuthFailure)
            .await
            .unwrap();
        let err = pool.lease(Provider::DeepSeek).await.unwrap_err();
        assert!(matches!(err, KeyPoolError::NoHealthyKey { .. }));
    }

    #[tokio::test]
    async fn reconciler_restores_after_cooldown() {
        let pool = pool_with(1);
        let idx = ApiKeyIndex::new(0);
        for _ in 0..2 {
            pool.record(Provider::DeepSeek, idx, CallOutcome::Failure)
                .await
                .unwrap();
        }
        assert!(pool.lease(Provider::DeepSeek).await.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        pool.reconcile(Provider::DeepSeek).await;
        assert!(pool.lease(Provider::DeepSeek).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_fast() {
        let pool = KeyPoolImpl::new(KeyPoolConfig::testing());
        let err = pool.lease(Provider::Anthropic).await.unwrap_err();
        assert!(matches!(err, KeyPoolError::ProviderNotConfigured { .. }));
    }
}
