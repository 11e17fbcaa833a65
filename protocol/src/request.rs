//! Completion request

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ToolDefinition};

/// Provider-agnostic chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
  /// Model identifier as the provider knows it (no provider prefix)
  pub model: String,

  /// Ordered conversation context
  pub messages: Vec<ChatMessage>,

  /// Sampling temperature (0.0 to 2.0)
  #[serde(default)]
  pub temperature: Option<f32>,

  /// Top p (nucleus sampling)
  #[serde(default)]
  pub top_p: Option<f32>,

  /// Maximum tokens to generate
  #[serde(default)]
  pub max_tokens: Option<u32>,

  /// Presence penalty
  #[serde(default)]
  pub presence_penalty: Option<f32>,

  /// Frequency penalty
  #[serde(default)]
  pub frequency_penalty: Option<f32>,

  /// Stop sequences
  #[serde(default)]
  pub stop: Option<Vec<String>>,

  /// Whether to stream responses
  #[serde(default)]
  pub stream: bool,

  /// Tools available for the model to call
  #[serde(default)]
  pub tools: Option<Vec<ToolDefinition>>,

  /// How the model may use `tools`
  #[serde(default)]
  pub tool_choice: Option<ToolChoice>,

  /// Output shape constraint
  #[serde(default)]
  pub response_format: Option<ResponseFormat>,

  /// End-user tag forwarded for abuse monitoring
  #[serde(default)]
  pub user: Option<String>,
}

impl CompletionRequest {
  pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
    Self {
      model: model.into(),
      messages,
      temperature: None,
      top_p: None,
      max_tokens: None,
      presence_penalty: None,
      frequency_penalty: None,
      stop: None,
      stream: false,
      tools: None,
      tool_choice: None,
      response_format: None,
      user: None,
    }
  }
}

/// Tool choice directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ToolChoice {
  Auto,
  None,
  Required,
  Function { name: String },
}

/// Response format directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ResponseFormat {
  Text,
  JsonObject,
  JsonSchema {
    name: String,
    schema: serde_json::Value,
    #[serde(default)]
    strict: bool,
  },
}
