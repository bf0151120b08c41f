//! `BreakerFabric`: per-provider breaker registry
//!
//! Hands out a [`CircuitBreaker`] by provider name, constructing one lazily on first use
//! with the provider's configured base threshold/timeout (spec §4.3's "Fabric").

use std::sync::Arc;

use dashmap::DashMap;

use super::breaker::CircuitBreaker;
use super::config::BreakerConfig;
use crate::time_provider::SharedTimeProvider;

/// Registry of per-provider circuit breakers, shared across the process.
pub struct BreakerFabric {
    config: BreakerConfig,
    time: SharedTimeProvider,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerFabric {
    #[must_use]
    pub fn new(config: BreakerConfig, time: SharedTimeProvider) -> Self {
        Self {
            config,
            time,
            breakers: DashMap::new(),
        }
    }

    /// Returns the breaker for `provider`, constructing it on first use.
    #[must_use]
    pub fn get(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    provider,
                    self.config.clone(),
                    Arc::clone(&self.time),
                ))
            })
            .clone()
    }

    /// Snapshots of every breaker constructed so far, for `get_all_health_status`-style
    /// diagnostics.
    pub async fn snapshot_all(&self) -> Vec<super::domain_types::BreakerSnapshot> {
        let mut out = Vec::with_capacity(self.breakers.len());
        for entry in &self.breakers {
            out.push(entry.value().snapshot().await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_provider::test_time_provider;

    #[test]
    fn lazily_constructs_one_breaker_per_provider() {
        let fabric = BreakerFabric::new(BreakerConfig::testing(), test_time_provider());
        let a = fabric.get("deepseek");
        let b = fabric.get("deepseek");
        assert!(Arc::ptr_eq(&a, &b));
        let c = fabric.get("perplexity");
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
