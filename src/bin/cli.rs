//! `agentry-cli`: one-off developer queries against a configured provider, bypassing the
//! dispatcher/conductor layers. Useful for exercising the Router and key pool by hand.

use std::sync::Arc;

use agentry_core::breaker::BreakerFabric;
use agentry_core::domain_types::Provider;
use agentry_core::key_pool::KeyPoolImpl;
use agentry_core::observability;
use agentry_core::router::{query, QueryOptions, ReqwestHttpClient, RouterImpl};
use agentry_core::time_provider::production_time_provider;
use agentry_core::CoreConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProvider {
    Deepseek,
    Qwen,
    Perplexity,
    Openai,
    Anthropic,
    Ollama,
}

impl From<CliProvider> for Provider {
    fn from(value: CliProvider) -> Self {
        match value {
            CliProvider::Deepseek => Provider::DeepSeek,
            CliProvider::Qwen => Provider::Qwen,
            CliProvider::Perplexity => Provider::Perplexity,
            CliProvider::Openai => Provider::OpenAi,
            CliProvider::Anthropic => Provider::Anthropic,
            CliProvider::Ollama => Provider::Ollama,
        }
    }
}

#[derive(Parser)]
#[command(name = "agentry-cli", about = "Developer CLI for the agentry-core router")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a single prompt to `provider` and print the resulting `QueryResult` as JSON.
    Query {
        #[arg(long, value_enum)]
        provider: CliProvider,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Bypass the environment credential for this provider, supplying a key directly.
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_pretty();
    let cli = Cli::parse();

    match cli.command {
        Command::Query {
            provider,
            prompt,
            model,
            temperature,
            max_tokens,
            api_key,
        } => {
            let provider: Provider = provider.into();
            let config = CoreConfig::from_env()?;

            let key_pool = Arc::new(KeyPoolImpl::new(config.key_pool.clone()));
            let secret = match api_key {
                Some(key) => key,
                None => {
                    let var = format!("{}_API_KEY", provider.as_str().to_uppercase());
                    std::env::var(&var)
                        .with_context(|| format!("{var} not set and no --api-key given"))?
                }
            };
            key_pool.register_keys(provider, vec![secret]);

            let time = production_time_provider();
            let breakers = Arc::new(BreakerFabric::new(config.breaker.clone(), Arc::clone(&time)));
            let http_client = Arc::new(ReqwestHttpClient::new());
            let router = RouterImpl::new(config.router, key_pool, breakers, http_client, time);

            let mut options = QueryOptions::new();
            options.model = model;
            options.temperature = temperature;
            options.max_tokens = max_tokens;
            options.use_cache = false;

            let result = query(&router, None, provider, &prompt, options).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
