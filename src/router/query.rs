//! `query()` convenience wrapper with read-through cache (spec §6, fully specified in §10.6).
//!
//! Lives as a thin façade over [`super::router::RouterImpl`] rather than a mixin on the router
//! itself, per §9's design note on "mixin-based composition".

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::domain_types::{AgentRequest, Channel, RequestContext, ExtraKwargs};
use super::router::RouterImpl;
use super::traits::{Router, ResponseCache};
use crate::domain_types::{CorrelationId, Provider, TaskType};

/// Caller-supplied knobs for [`query`], mirroring the prior implementation's
/// `query(provider, prompt, **kwargs)` convenience call.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub task_type: Option<TaskType>,
    pub extra: ExtraKwargs,
    /// Whether to consult/populate the cache for this call. Defaults to `true`.
    pub use_cache: bool,
    pub cache_ttl_secs: Option<u64>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_cache: true,
            ..Default::default()
        }
    }
}

/// Shape returned by `query()`, matching the prior implementation's
/// `_build_query_result`-equivalent response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub response: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
    pub latency_ms: u64,
    pub api_key_id: Option<usize>,
    pub success: bool,
    pub error: Option<String>,
    pub from_cache: bool,
}

/// Stable fingerprint over the finite, named set of cacheable inputs — never over arbitrary
/// caller kwargs (§9's design note on cache-key hygiene).
fn fingerprint(provider: Provider, prompt: &str, options: &QueryOptions) -> String {
    let mut hasher = DefaultHasher::new();
    provider.as_str().hash(&mut hasher);
    prompt.hash(&mut hasher);
    options.model.hash(&mut hasher);
    options.max_tokens.hash(&mut hasher);
    // f32 doesn't implement Hash; fold its bits in directly.
    options.temperature.map(f32::to_bits).hash(&mut hasher);
    let mut extra_keys: Vec<&String> = options.extra.0.keys().collect();
    extra_keys.sort();
    for key in extra_keys {
        key.hash(&mut hasher);
        options.extra.0[key].to_string().hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// Runs `provider`/`prompt` through `router`, short-circuiting on a cache hit and populating
/// the cache on a successful miss. Cache-backend errors are swallowed (best-effort, consistent
/// with §9's telemetry note) — a cache outage degrades to always-miss, never to a failed query.
pub async fn query(
    router: &RouterImpl,
    cache: Option<&dyn ResponseCache>,
    provider: Provider,
    prompt: &str,
    options: QueryOptions,
) -> QueryResult {
    let fp = fingerprint(provider, prompt, &options);

    if options.use_cache {
        if let Some(cache) = cache {
            if let Some(cached) = cache.get(&fp).await {
                if let Ok(mut result) = serde_json::from_value::<QueryResult>(cached) {
                    result.from_cache = true;
                    return result;
                }
                warn!(fingerprint = %fp, "cached query result failed to deserialize, treating as a miss");
            }
        }
    }

    let request = AgentRequest {
        correlation_id: CorrelationId::generate(),
        provider,
        task_type: options
            .task_type
            .clone()
            .unwrap_or_else(|| TaskType::try_new("chat".to_string()).unwrap()),
        prompt: prompt.to_string(),
        model: options.model.clone(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        extra: options.extra.clone(),
        context: RequestContext::default(),
    };

    let response = router.send_request(request, Some(Channel::DirectApi)).await;

    let result = QueryResult {
        response: response.content,
        model: response.model,
        tokens_used: response.tokens_used.map(|t| t.total_tokens),
        latency_ms: response.latency_ms,
        api_key_id: response.api_key_index.map(crate::key_pool::ApiKeyIndex::into_inner),
        success: response.success,
        error: response.error,
        from_cache: false,
    };

    if options.use_cache && result.success {
        if let Some(cache) = cache {
            if let Ok(value) = serde_json::to_value(&result) {
                cache.set(&fp, value, options.cache_ttl_secs).await;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::key_pool::{KeyPoolConfig, KeyPoolImpl};
    use crate::router::config::RouterConfig;
    use crate::router::traits::{HttpClient, RouterError};
    use crate::time_provider::test_time_provider;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingHttpClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl HttpClient for CountingHttpClient {
        async fn post_json(
            &self,
            _url: &str,
            _bearer_token: &str,
            _body: Value,
            _timeout_ms: u64,
        ) -> Result<(u16, Value), RouterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((200, serde_json::json!({"choices": [{"message": {"content": "cached-or-not"}}]})))
        }
    }

    #[derive(Default)]
    struct InMemoryCache {
        entries: DashMap<String, Value>,
    }

    #[async_trait]
    impl ResponseCache for InMemoryCache {
        async fn get(&self, fingerprint: &str) -> Option<Value> {
            self.entries.get(fingerprint).map(|v| v.clone())
        }

        async fn set(&self, fingerprint: &str, value: Value, _ttl_secs: Option<u64>) {
            self.entries.insert(fingerprint.to_string(), value);
        }

        async fn clear_all(&self) -> usize {
            let n = self.entries.len();
            self.entries.clear();
            n
        }
    }

    fn router(calls: Arc<CountingHttpClient>) -> RouterImpl {
        let key_pool = Arc::new(KeyPoolImpl::new(KeyPoolConfig::testing()));
        key_pool.register_keys(Provider::DeepSeek, vec!["secret".to_string()]);
        RouterImpl::new(
            RouterConfig::testing(),
            key_pool,
            Arc::new(crate::breaker::BreakerFabric::new(
                BreakerConfig::testing(),
                test_time_provider(),
            )),
            calls,
            test_time_provider(),
        )
    }

    #[tokio::test]
    async fn second_identical_query_hits_the_cache() {
        let http = Arc::new(CountingHttpClient {
            calls: AtomicU32::new(0),
        });
        let r = router(http.clone());
        let cache = InMemoryCache::default();

        let first = query(&r, Some(&cache), Provider::DeepSeek, "hello", QueryOptions::new()).await;
        assert!(first.success);
        assert!(!first.from_cache);

        let second = query(&r, Some(&cache), Provider::DeepSeek, "hello", QueryOptions::new()).await;
        assert!(second.from_cache);
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn use_cache_false_always_calls_through() {
        let http = Arc::new(CountingHttpClient {
            calls: AtomicU32::new(0),
        });
        let r = router(http.clone());
        let cache = InMemoryCache::default();
        let mut opts = QueryOptions::new();
        opts.use_cache = false;

        query(&r, Some(&cache), Provider::DeepSeek, "hello", opts.clone()).await;
        query(&r, Some(&cache), Provider::DeepSeek, "hello", opts).await;
        assert_eq!(http.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn different_prompts_do_not_collide_in_the_cache() {
        let http = Arc::new(CountingHttpClient {
            calls: AtomicU32::new(0),
        });
        let r = router(http.clone());
        let cache = InMemoryCache::default();

        query(&r, Some(&cache), Provider::DeepSeek, "a", QueryOptions::new()).await;
        query(&r, Some(&cache), Provider::DeepSeek, "b", QueryOptions::new()).await;
        assert_eq!(http.calls.load(Ordering::SeqCst), 2);
    }
}
