// Bundled Catalog
// Providers and models available before the user configures anything

use std::collections::BTreeMap;

use crate::catalog::{
  Model, ModelPricing, Provider, ProviderCapabilities, RateLimitConfig, ReasoningFormat,
  SamplingDefaults,
};

/// Default providers
pub fn bundled_providers() -> Vec<Provider> {
  vec![
    Provider {
      id: "openai".to_string(),
      name: "OpenAI".to_string(),
      base_url: "https://api.openai.com/v1".to_string(),
      api_endpoint: "/chat/completions".to_string(),
      models_endpoint: "/models".to_string(),
      requires_api_key: true,
      api_key: None,
      api_key_env: Some("OPENAI_API_KEY".to_string()),
      enabled: true,
      capabilities: ProviderCapabilities {
        vision: true,
        model_discovery: true,
        ..ProviderCapabilities::default()
      },
      headers: BTreeMap::new(),
      include_stream_usage: true,
      rate_limit: RateLimitConfig {
        requests_per_minute: Some(500),
        tokens_per_minute: Some(30_000),
        ..RateLimitConfig::default()
      },
    },
    Provider {
      id: "deepseek".to_string(),
      name: "DeepSeek".to_string(),
      base_url: "https://api.deepseek.com/v1".to_string(),
      api_endpoint: "/chat/completions".to_string(),
      models_endpoint: "/models".to_string(),
      requires_api_key: true,
      api_key: None,
      api_key_env: Some("DEEPSEEK_API_KEY".to_string()),
      enabled: true,
      capabilities: ProviderCapabilities::default(),
      headers: BTreeMap::new(),
      include_stream_usage: true,
      rate_limit: RateLimitConfig::default(),
    },
    Provider {
      id: "openrouter".to_string(),
      name: "OpenRouter".to_string(),
      base_url: "https://openrouter.ai/api/v1".to_string(),
      api_endpoint: "/chat/completions".to_string(),
      models_endpoint: "/models".to_string(),
      requires_api_key: true,
      api_key: None,
      api_key_env: Some("OPENROUTER_API_KEY".to_string()),
      enabled: true,
      capabilities: ProviderCapabilities {
        vision: true,
        model_discovery: true,
        ..ProviderCapabilities::default()
      },
      headers: BTreeMap::from([("X-Title".to_string(), "Solace".to_string())]),
      include_stream_usage: true,
      rate_limit: RateLimitConfig {
        requests_per_minute: Some(20),
        ..RateLimitConfig::default()
      },
    },
    // Local, no auth needed
    Provider {
      id: "ollama".to_string(),
      name: "Ollama".to_string(),
      base_url: "http://localhost:11434/v1".to_string(),
      api_endpoint: "/chat/completions".to_string(),
      models_endpoint: "/models".to_string(),
      requires_api_key: false,
      api_key: None,
      api_key_env: None,
      enabled: true,
      capabilities: ProviderCapabilities {
        model_discovery: true,
        ..ProviderCapabilities::default()
      },
      headers: BTreeMap::new(),
      include_stream_usage: true,
      rate_limit: RateLimitConfig {
        max_retries: 1,
        ..RateLimitConfig::default()
      },
    },
  ]
}

/// Default models
pub fn bundled_models() -> Vec<Model> {
  let companion = SamplingDefaults {
    temperature: Some(0.7),
    ..SamplingDefaults::default()
  };

  vec![
    Model {
      name: "GPT-4o".to_string(),
      supports_tool_calling: true,
      supports_vision: true,
      context_length: 128_000,
      max_output_tokens: 16_384,
      defaults: companion,
      pricing: Some(ModelPricing {
        input_per_million: 2.5,
        output_per_million: 10.0,
      }),
      is_default: true,
      ..Model::new("openai", "gpt-4o")
    },
    Model {
      name: "GPT-4o mini".to_string(),
      supports_tool_calling: true,
      supports_vision: true,
      context_length: 128_000,
      max_output_tokens: 16_384,
      defaults: companion,
      pricing: Some(ModelPricing {
        input_per_million: 0.15,
        output_per_million: 0.6,
      }),
      ..Model::new("openai", "gpt-4o-mini")
    },
    Model {
      name: "DeepSeek Chat".to_string(),
      supports_tool_calling: true,
      context_length: 64_000,
      max_output_tokens: 8_192,
      defaults: companion,
      is_default: true,
      ..Model::new("deepseek", "deepseek-chat")
    },
    Model {
      name: "DeepSeek Reasoner".to_string(),
      supports_reasoning: true,
      reasoning_format: ReasoningFormat::Field {
        field: "reasoning_content".to_string(),
      },
      context_length: 64_000,
      max_output_tokens: 32_768,
      ..Model::new("deepseek", "deepseek-reasoner")
    },
    Model {
      name: "Llama 3.3 70B".to_string(),
      supports_tool_calling: true,
      context_length: 131_072,
      max_output_tokens: 8_192,
      defaults: companion,
      is_default: true,
      ..Model::new("openrouter", "meta-llama/llama-3.3-70b-instruct")
    },
    Model {
      name: "Llama 3.2".to_string(),
      supports_tool_calling: true,
      context_length: 8_192,
      max_output_tokens: 2_048,
      defaults: companion,
      is_default: true,
      ..Model::new("ollama", "llama3.2")
    },
    Model {
      name: "Qwen 3".to_string(),
      supports_tool_calling: true,
      supports_reasoning: true,
      reasoning_format: ReasoningFormat::ThinkTags,
      context_length: 32_768,
      max_output_tokens: 4_096,
      ..Model::new("ollama", "qwen3")
    },
  ]
}
