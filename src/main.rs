//! Process entrypoint: wires every subsystem from [`CoreConfig`] and serves the ambient
//! admin/health surface (spec §10.1, §10.3).

use std::env;
use std::sync::Arc;

use agentry_core::breaker::BreakerFabric;
use agentry_core::dispatcher::{HealthMonitor, HealthMonitorConfig};
use agentry_core::domain_types::Provider;
use agentry_core::key_pool::KeyPoolImpl;
use agentry_core::router::{ReqwestHttpClient, RouterImpl};
use agentry_core::time_provider::production_time_provider;
use agentry_core::{observability, server, CoreConfig};
use anyhow::Result;
use tracing::{info, warn};

/// Provider env var names that carry a credential, per
/// `original_source/backend/agents/config_validator.py`'s `required_keys`.
const PROVIDER_KEY_VARS: &[(Provider, &str)] = &[
    (Provider::DeepSeek, "DEEPSEEK_API_KEY"),
    (Provider::Qwen, "QWEN_API_KEY"),
    (Provider::Perplexity, "PERPLEXITY_API_KEY"),
    (Provider::OpenAi, "OPENAI_API_KEY"),
    (Provider::Anthropic, "ANTHROPIC_API_KEY"),
];

fn register_provider_keys(key_pool: &KeyPoolImpl) {
    for (provider, var) in PROVIDER_KEY_VARS {
        match env::var(var) {
            Ok(value) if !value.trim().is_empty() => {
                let secrets = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                info!(provider = %provider, count = secrets.len(), "registered provider keys");
                key_pool.register_keys(*provider, secrets);
            }
            _ => warn!(provider = %provider, var, "no keys configured for provider"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if env::var("LOG_FORMAT").as_deref() == Ok("json") {
        observability::init_json();
    } else {
        observability::init_pretty();
    }

    let config = CoreConfig::from_env()?;
    info!("starting agentry-core");

    let key_pool = Arc::new(KeyPoolImpl::new(config.key_pool.clone()));
    register_provider_keys(&key_pool);

    let time = production_time_provider();
    let breakers = Arc::new(BreakerFabric::new(config.breaker.clone(), Arc::clone(&time)));
    let http_client = Arc::new(ReqwestHttpClient::new());

    let _router = RouterImpl::new(
        config.router.clone(),
        key_pool.clone(),
        breakers.clone(),
        http_client,
        Arc::clone(&time),
    );

    let health = Arc::new(HealthMonitor::new(
        HealthMonitorConfig::default(),
        Arc::clone(&time),
    ));

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let (listener, addr) = server::bind(port).await?;
    info!(%addr, "admin surface listening");

    let router = server::create_router(health);
    server::serve_with_graceful_shutdown(listener, router).await?;

    Ok(())
}
