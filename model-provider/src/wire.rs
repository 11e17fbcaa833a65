//! OpenAI-compatible wire format
//!
//! Request bodies are built as JSON values the way every compatible server
//! expects them; responses are read leniently since servers differ in which
//! optional fields they send.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use solace_config::ReasoningFormat;
use solace_protocol::{
  ChatMessage, Choice, CompletionRequest, CompletionResponse, FinishReason, ResponseFormat, Role,
  ToolCall, ToolChoice, Usage,
};

use crate::streaming::reasoning::{Segment, ThinkTagSplitter};

/// Build the chat completion body
pub fn request_body(request: &CompletionRequest, include_stream_usage: bool) -> Value {
  let mut body = Map::new();
  body.insert("model".to_string(), json!(request.model));
  body.insert(
    "messages".to_string(),
    Value::Array(request.messages.iter().map(message_value).collect()),
  );
  body.insert("stream".to_string(), json!(request.stream));
  if request.stream && include_stream_usage {
    body.insert("stream_options".to_string(), json!({"include_usage": true}));
  }

  let mut optional = |key: &str, value: Option<Value>| {
    if let Some(value) = value {
      body.insert(key.to_string(), value);
    }
  };
  optional("temperature", request.temperature.map(|v| json!(v)));
  optional("top_p", request.top_p.map(|v| json!(v)));
  optional("max_tokens", request.max_tokens.map(|v| json!(v)));
  optional("presence_penalty", request.presence_penalty.map(|v| json!(v)));
  optional("frequency_penalty", request.frequency_penalty.map(|v| json!(v)));
  optional("stop", request.stop.as_ref().map(|v| json!(v)));
  optional(
    "tools",
    request.tools.as_ref().map(|tools| {
      tools
        .iter()
        .map(|tool| {
          json!({
            "type": "function",
            "function": {
              "name": tool.name,
              "description": tool.description,
              "parameters": tool.parameters,
            }
          })
        })
        .collect()
    }),
  );
  optional("tool_choice", request.tool_choice.as_ref().map(tool_choice_value));
  optional(
    "response_format",
    request.response_format.as_ref().map(response_format_value),
  );
  optional("user", request.user.as_ref().map(|v| json!(v)));

  Value::Object(body)
}

fn message_value(message: &ChatMessage) -> Value {
  let mut value = Map::new();
  value.insert("role".to_string(), json!(message.role.as_str()));

  let content = if message.has_images() {
    let mut parts = Vec::with_capacity(message.images.len() + 1);
    if !message.content.is_empty() {
      parts.push(json!({"type": "text", "text": message.content}));
    }
    for image in &message.images {
      let mut image_url = json!({"url": image.url});
      if let Some(detail) = &image.detail {
        image_url["detail"] = json!(detail);
      }
      parts.push(json!({"type": "image_url", "image_url": image_url}));
    }
    Value::Array(parts)
  } else if message.content.is_empty() && !message.tool_calls().is_empty() {
    Value::Null
  } else {
    json!(message.content)
  };
  value.insert("content".to_string(), content);

  if let Some(name) = &message.name {
    value.insert("name".to_string(), json!(name));
  }
  if message.role == Role::Assistant && !message.tool_calls().is_empty() {
    value.insert("tool_calls".to_string(), json!(message.tool_calls()));
  }
  if let Some(id) = &message.tool_call_id {
    value.insert("tool_call_id".to_string(), json!(id));
  }
  Value::Object(value)
}

fn tool_choice_value(choice: &ToolChoice) -> Value {
  match choice {
    ToolChoice::Auto => json!("auto"),
    ToolChoice::None => json!("none"),
    ToolChoice::Required => json!("required"),
    ToolChoice::Function { name } => json!({"type": "function", "function": {"name": name}}),
  }
}

fn response_format_value(format: &ResponseFormat) -> Value {
  match format {
    ResponseFormat::Text => json!({"type": "text"}),
    ResponseFormat::JsonObject => json!({"type": "json_object"}),
    ResponseFormat::JsonSchema {
      name,
      schema,
      strict,
    } => json!({
      "type": "json_schema",
      "json_schema": {"name": name, "schema": schema, "strict": strict}
    }),
  }
}

/// Usage block, shared by streamed and non-streamed responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUsage {
  #[serde(default)]
  prompt_tokens: u32,
  #[serde(default)]
  completion_tokens: u32,
  #[serde(default)]
  total_tokens: u32,
  #[serde(default)]
  completion_tokens_details: Option<WireCompletionDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireCompletionDetails {
  #[serde(default)]
  reasoning_tokens: Option<u32>,
}

impl From<WireUsage> for Usage {
  fn from(usage: WireUsage) -> Self {
    let total = if usage.total_tokens == 0 {
      usage.prompt_tokens.saturating_add(usage.completion_tokens)
    } else {
      usage.total_tokens
    };
    Usage {
      prompt_tokens: usage.prompt_tokens,
      completion_tokens: usage.completion_tokens,
      total_tokens: total,
      reasoning_tokens: usage
        .completion_tokens_details
        .and_then(|details| details.reasoning_tokens),
    }
  }
}

/// Non-streamed chat completion body
#[derive(Debug, Deserialize)]
pub struct WireResponse {
  #[serde(default)]
  id: String,
  #[serde(default)]
  model: String,
  #[serde(default)]
  created: u64,
  #[serde(default)]
  choices: Vec<WireChoice>,
  #[serde(default)]
  usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
  #[serde(default)]
  index: u32,
  message: WireMessage,
  #[serde(default)]
  finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
  #[serde(default)]
  content: Option<String>,
  #[serde(default)]
  tool_calls: Option<Vec<ToolCall>>,
  #[serde(flatten)]
  extra: Map<String, Value>,
}

impl WireResponse {
  /// Convert to the protocol shape, routing reasoning per `format`
  pub fn into_response(self, format: &ReasoningFormat) -> CompletionResponse {
    let choices = self
      .choices
      .into_iter()
      .map(|choice| {
        let raw = choice.message.content.unwrap_or_default();
        let (content, reasoning) = match format {
          ReasoningFormat::ThinkTags => split_think_tags(&raw),
          ReasoningFormat::Field { field } => {
            let reasoning = choice.message.extra.get(field).and_then(Value::as_str);
            (raw, reasoning.unwrap_or_default().to_string())
          }
          ReasoningFormat::None => (raw, String::new()),
        };

        let mut message = ChatMessage::assistant(content)
          .with_tool_calls(choice.message.tool_calls.unwrap_or_default());
        if !reasoning.is_empty() {
          message = message.with_reasoning(reasoning);
        }
        Choice {
          index: choice.index,
          message,
          finish_reason: choice.finish_reason,
        }
      })
      .collect();

    CompletionResponse {
      id: self.id,
      model: self.model,
      choices,
      usage: self.usage.map(Usage::from),
      created: self.created,
    }
  }
}

fn split_think_tags(raw: &str) -> (String, String) {
  let mut splitter = ThinkTagSplitter::default();
  let mut content = String::new();
  let mut reasoning = String::new();
  let segments = splitter.push(raw).into_iter().chain(splitter.finish());
  for segment in segments {
    match segment {
      Segment::Content(text) => content.push_str(&text),
      Segment::Reasoning(text) => reasoning.push_str(&text),
    }
  }
  (content, reasoning)
}

/// `GET /models` body
#[derive(Debug, Deserialize)]
pub struct WireModelList {
  #[serde(default)]
  pub data: Vec<WireModelEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WireModelEntry {
  pub id: String,
}
