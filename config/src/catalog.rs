// Provider and Model Catalog
// Records describing the remote AI backends and the models they host

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remote AI service endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
  /// Unique provider identifier (e.g., "openai", "ollama")
  pub id: String,

  /// Display name
  pub name: String,

  /// Base URL, without the endpoint path
  pub base_url: String,

  /// Chat completion endpoint path
  #[serde(default = "default_api_endpoint")]
  pub api_endpoint: String,

  /// Model listing endpoint path
  #[serde(default = "default_models_endpoint")]
  pub models_endpoint: String,

  /// Whether requests need a credential
  #[serde(default)]
  pub requires_api_key: bool,

  /// Credential, when set inline
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,

  /// Environment variable holding the credential
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key_env: Option<String>,

  #[serde(default = "default_true")]
  pub enabled: bool,

  #[serde(default)]
  pub capabilities: ProviderCapabilities,

  /// Extra headers sent with every request
  #[serde(default)]
  pub headers: BTreeMap<String, String>,

  /// Ask for a trailing usage chunk when streaming
  #[serde(default = "default_true")]
  pub include_stream_usage: bool,

  #[serde(default)]
  pub rate_limit: RateLimitConfig,
}

impl Provider {
  /// Non-empty credential, if any
  pub fn credential(&self) -> Option<&str> {
    self.api_key.as_deref().filter(|key| !key.is_empty())
  }

  /// True when a request may be issued without violating the
  /// `requires_api_key` invariant
  pub fn has_required_credential(&self) -> bool {
    !self.requires_api_key || self.credential().is_some()
  }

  /// Fills `api_key` from `api_key_env` when no inline key is set
  pub fn resolve_credential(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
    if self.credential().is_some() {
      return;
    }
    if let Some(var) = &self.api_key_env {
      self.api_key = lookup(var).filter(|key| !key.is_empty());
    }
  }
}

/// Structural capabilities of a provider's API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCapabilities {
  pub streaming: bool,
  pub tool_calling: bool,
  pub vision: bool,
  /// Exposes a model listing endpoint
  pub model_discovery: bool,
}

impl Default for ProviderCapabilities {
  fn default() -> Self {
    Self {
      streaming: true,
      tool_calling: true,
      vision: false,
      model_discovery: false,
    }
  }
}

/// Per-provider rate limit and retry settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
  /// Local admission limit on requests per rolling minute
  #[serde(skip_serializing_if = "Option::is_none")]
  pub requests_per_minute: Option<u32>,

  /// Local admission limit on estimated tokens per rolling minute
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tokens_per_minute: Option<u32>,

  /// First retry delay when the server gives no hint
  pub retry_after_ms: u64,

  /// Retries after the first attempt
  pub max_retries: u32,

  pub backoff_multiplier: f64,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      requests_per_minute: None,
      tokens_per_minute: None,
      retry_after_ms: 1000,
      max_retries: 3,
      backoff_multiplier: 2.0,
    }
  }
}

/// Selectable model hosted by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
  /// Model id as the provider knows it
  pub id: String,

  /// Provider this model belongs to
  pub provider_id: String,

  /// Human-readable name
  #[serde(default)]
  pub name: String,

  #[serde(default = "default_true")]
  pub supports_streaming: bool,

  #[serde(default)]
  pub supports_tool_calling: bool,

  #[serde(default)]
  pub supports_vision: bool,

  /// Emits a separate thinking stream
  #[serde(default)]
  pub supports_reasoning: bool,

  /// How thinking tokens are delivered on the wire
  #[serde(default)]
  pub reasoning_format: ReasoningFormat,

  /// Context window in tokens
  #[serde(default = "default_context_length")]
  pub context_length: u32,

  #[serde(default = "default_max_output_tokens")]
  pub max_output_tokens: u32,

  #[serde(default)]
  pub defaults: SamplingDefaults,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pricing: Option<ModelPricing>,

  #[serde(default)]
  pub is_default: bool,
}

impl Model {
  /// Minimal model record with default limits and no optional capabilities
  pub fn new(provider_id: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      provider_id: provider_id.into(),
      name: String::new(),
      supports_streaming: true,
      supports_tool_calling: false,
      supports_vision: false,
      supports_reasoning: false,
      reasoning_format: ReasoningFormat::None,
      context_length: default_context_length(),
      max_output_tokens: default_max_output_tokens(),
      defaults: SamplingDefaults::default(),
      pricing: None,
      is_default: false,
    }
  }

  pub fn display_name(&self) -> &str {
    if self.name.is_empty() {
      &self.id
    } else {
      &self.name
    }
  }

  /// Reasoning routing actually applied to this model's stream.
  ///
  /// Non-reasoning models never route anything to the thinking channel; a
  /// reasoning model without an explicit format uses the common
  /// `reasoning_content` delta field.
  pub fn effective_reasoning_format(&self) -> ReasoningFormat {
    match (&self.reasoning_format, self.supports_reasoning) {
      (_, false) => ReasoningFormat::None,
      (ReasoningFormat::None, true) => ReasoningFormat::Field {
        field: "reasoning_content".to_string(),
      },
      (format, true) => format.clone(),
    }
  }
}

/// Wire delivery of thinking tokens
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningFormat {
  #[default]
  None,
  /// Separate delta field, e.g. `reasoning_content` or `reasoning`
  Field { field: String },
  /// Inline `<think>...</think>` spans inside the content field
  ThinkTags,
}

/// Model-level sampling defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingDefaults {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub top_p: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_tokens: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub presence_penalty: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub frequency_penalty: Option<f32>,
}

/// Model pricing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
  /// Cost per 1M input tokens (USD)
  pub input_per_million: f64,

  /// Cost per 1M output tokens (USD)
  pub output_per_million: f64,
}

impl ModelPricing {
  /// Cost in USD of a call with the given token counts
  pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    (f64::from(prompt_tokens) * self.input_per_million
      + f64::from(completion_tokens) * self.output_per_million)
      / 1_000_000.0
  }
}

fn default_true() -> bool {
  true
}

fn default_api_endpoint() -> String {
  "/chat/completions".to_string()
}

fn default_models_endpoint() -> String {
  "/models".to_string()
}

fn default_context_length() -> u32 {
  8192
}

fn default_max_output_tokens() -> u32 {
  4096
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn minimal_provider_table_fills_defaults() {
    let provider: Provider = toml::from_str(
      r#"
        id = "local"
        name = "Local"
        base_url = "http://localhost:8080/v1"
      "#,
    )
    .expect("parse provider");

    assert_eq!(provider.api_endpoint, "/chat/completions");
    assert!(provider.enabled);
    assert!(provider.capabilities.streaming);
    assert_eq!(provider.rate_limit.max_retries, 3);
    assert_eq!(provider.rate_limit.retry_after_ms, 1000);
  }

  #[test]
  fn credential_resolves_from_env_lookup() {
    let mut provider: Provider = toml::from_str(
      r#"
        id = "openai"
        name = "OpenAI"
        base_url = "https://api.openai.com/v1"
        requires_api_key = true
        api_key_env = "OPENAI_API_KEY"
      "#,
    )
    .expect("parse provider");
    assert!(!provider.has_required_credential());

    provider.resolve_credential(&|var| (var == "OPENAI_API_KEY").then(|| "sk-test".to_string()));
    assert_eq!(provider.credential(), Some("sk-test"));
    assert!(provider.has_required_credential());
  }

  #[test]
  fn inline_key_wins_over_env() {
    let mut provider: Provider = toml::from_str(
      r#"
        id = "openai"
        name = "OpenAI"
        base_url = "https://api.openai.com/v1"
        api_key = "inline"
        api_key_env = "OPENAI_API_KEY"
      "#,
    )
    .expect("parse provider");

    provider.resolve_credential(&|_| Some("from-env".to_string()));
    assert_eq!(provider.credential(), Some("inline"));
  }

  #[test]
  fn reasoning_format_only_applies_to_reasoning_models() {
    let mut model = Model::new("deepseek", "deepseek-chat");
    model.reasoning_format = ReasoningFormat::ThinkTags;
    assert_eq!(model.effective_reasoning_format(), ReasoningFormat::None);

    model.supports_reasoning = true;
    assert_eq!(model.effective_reasoning_format(), ReasoningFormat::ThinkTags);

    model.reasoning_format = ReasoningFormat::None;
    assert_eq!(
      model.effective_reasoning_format(),
      ReasoningFormat::Field {
        field: "reasoning_content".to_string()
      }
    );
  }

  #[test]
  fn pricing_cost_is_per_million() {
    let pricing = ModelPricing {
      input_per_million: 2.5,
      output_per_million: 10.0,
    };
    assert!((pricing.cost(1_000_000, 100_000) - 3.5).abs() < 1e-9);
  }
}
