//! Provider base URLs and default chat model ids.
//!
//! Values transcribed from `original_source/backend/agents/config_validator.py`'s
//! `AgentConfig` (`deepseek_base_url`, `qwen_base_url`, `perplexity_base_url`, plus the
//! corresponding `*_model` defaults); OpenAI/Anthropic/Ollama are the customary public and
//! local endpoints for those providers, added to cover every [`crate::domain_types::Provider`]
//! variant.

use crate::domain_types::Provider;

/// The provider's chat-completions endpoint, used for the `DIRECT_API` channel.
#[must_use]
pub fn base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
        Provider::Qwen => {
            "https://dashscope-intl.aliyuncs.com/compatible-mode/v1/chat/completions"
        }
        Provider::Perplexity => "https://api.perplexity.ai/chat/completions",
        Provider::OpenAi => "https://api.openai.com/v1/chat/completions",
        Provider::Anthropic => "https://api.anthropic.com/v1/messages",
        Provider::Ollama => "http://localhost:11434/api/chat",
    }
}

/// Default model id used when a request doesn't specify one.
#[must_use]
pub fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::DeepSeek => "deepseek-chat",
        Provider::Qwen => "qwen-plus",
        Provider::Perplexity => "sonar-pro",
        Provider::OpenAi => "gpt-4o-mini",
        Provider::Anthropic => "claude-3-5-sonnet-20241022",
        Provider::Ollama => "llama3",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_has_an_endpoint_and_model() {
        for p in [
            Provider::DeepSeek,
            Provider::Qwen,
            Provider::Perplexity,
            Provider::OpenAi,
            Provider::Anthropic,
            Provider::Ollama,
        ] {
            assert!(base_url(p).starts_with("http"));
            assert!(!default_model(p).is_empty());
        }
    }
}
