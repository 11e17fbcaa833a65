//! Request Builder
//!
//! Turns a conversation plus caller options into a `CompletionRequest` that
//! fits the target model's context window and capabilities.

use std::collections::HashSet;
use std::fmt::Write as _;

use solace_protocol::{
  ChatMessage, CompletionRequest, ResponseFormat, Role, ToolChoice, ToolDefinition,
};
use tracing::debug;

use crate::error::{Capability, ModelError, Result};
use crate::registry::ResolvedModel;

/// Fixed cost of a message's role and framing
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;
/// Rough cost of one image at low detail
const IMAGE_TOKENS: u32 = 85;
const CHARS_PER_TOKEN: u32 = 4;

/// Caller overrides for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
  pub temperature: Option<f32>,
  pub top_p: Option<f32>,
  pub max_tokens: Option<u32>,
  pub presence_penalty: Option<f32>,
  pub frequency_penalty: Option<f32>,
  pub stop: Option<Vec<String>>,
  /// Ask for a streamed response; ignored for models that cannot stream
  pub stream: bool,
  pub tools: Option<Vec<ToolDefinition>>,
  pub tool_choice: Option<ToolChoice>,
  pub response_format: Option<ResponseFormat>,
  pub user: Option<String>,
}

impl Default for RequestOptions {
  fn default() -> Self {
    Self {
      temperature: None,
      top_p: None,
      max_tokens: None,
      presence_penalty: None,
      frequency_penalty: None,
      stop: None,
      stream: true,
      tools: None,
      tool_choice: None,
      response_format: None,
      user: None,
    }
  }
}

/// Build a request for `target` from `history`.
///
/// Oldest non-system messages are dropped until the prompt fits. System
/// messages and the most recent user message are never dropped.
pub fn build(
  target: &ResolvedModel,
  history: &[ChatMessage],
  options: &RequestOptions,
) -> Result<CompletionRequest> {
  let model = &target.model;
  let tools = options.tools.clone().filter(|tools| !tools.is_empty());

  if tools.is_some() && !target.supports_tool_calling() {
    return Err(ModelError::CapabilityUnsupported {
      model: target.qualified_id(),
      capability: Capability::ToolCalling,
    });
  }
  if history.iter().any(ChatMessage::has_images) && !target.supports_vision() {
    return Err(ModelError::CapabilityUnsupported {
      model: target.qualified_id(),
      capability: Capability::Vision,
    });
  }

  let defaults = &model.defaults;
  let max_tokens = options
    .max_tokens
    .or(defaults.max_tokens)
    .map(|tokens| tokens.min(model.max_output_tokens));

  let reserved = max_tokens
    .unwrap_or(model.max_output_tokens)
    .min(model.context_length / 2);
  let tool_tokens = tools.as_deref().map_or(0, estimate_tool_tokens);
  let budget = model
    .context_length
    .saturating_sub(reserved)
    .saturating_sub(tool_tokens);

  let messages = fit_history(history, budget)?;

  Ok(CompletionRequest {
    model: model.id.clone(),
    messages,
    temperature: options.temperature.or(defaults.temperature),
    top_p: options.top_p.or(defaults.top_p),
    max_tokens,
    presence_penalty: options.presence_penalty.or(defaults.presence_penalty),
    frequency_penalty: options.frequency_penalty.or(defaults.frequency_penalty),
    stop: options.stop.clone().filter(|stop| !stop.is_empty()),
    stream: options.stream && target.supports_streaming(),
    tool_choice: tools.as_ref().and(options.tool_choice.clone()),
    tools,
    response_format: options.response_format.clone(),
    user: options.user.clone(),
  })
}

fn fit_history(history: &[ChatMessage], budget: u32) -> Result<Vec<ChatMessage>> {
  let mut total = estimate_tokens(history);
  if total <= budget {
    return Ok(history.to_vec());
  }

  let last_user = history.iter().rposition(|message| message.role == Role::User);
  let protected = |index: usize| history[index].role == Role::System || Some(index) == last_user;
  let mut keep = vec![true; history.len()];
  let mut dropped = 0usize;

  for index in 0..history.len() {
    if total <= budget {
      break;
    }
    if !keep[index] || protected(index) {
      continue;
    }

    keep[index] = false;
    let call_ids: HashSet<&str> = history[index]
      .tool_calls()
      .iter()
      .map(|call| call.id.as_str())
      .collect();
    for (later, message) in history.iter().enumerate().skip(index + 1) {
      if message
        .tool_call_id
        .as_deref()
        .is_some_and(|id| call_ids.contains(id))
      {
        keep[later] = false;
      }
    }
    drop_orphaned_tool_results(history, &mut keep);

    total = history
      .iter()
      .zip(&keep)
      .filter(|(_, kept)| **kept)
      .map(|(message, _)| estimate_message_tokens(message))
      .sum();
    dropped += 1;
  }

  if total > budget {
    return Err(ModelError::ContextOverflow {
      needed: total,
      available: budget,
    });
  }

  let fitted: Vec<ChatMessage> = history
    .iter()
    .zip(keep)
    .filter_map(|(message, kept)| kept.then(|| message.clone()))
    .collect();
  debug!(
    dropped,
    removed = history.len() - fitted.len(),
    estimated_tokens = total,
    budget,
    "trimmed conversation to fit context window"
  );
  Ok(fitted)
}

/// Tool results whose assistant call is no longer in the window
fn drop_orphaned_tool_results(history: &[ChatMessage], keep: &mut [bool]) {
  let live_calls: HashSet<&str> = history
    .iter()
    .zip(keep.iter())
    .filter(|(_, kept)| **kept)
    .flat_map(|(message, _)| message.tool_calls().iter().map(|call| call.id.as_str()))
    .collect();

  for (message, kept) in history.iter().zip(keep.iter_mut()) {
    if message.role == Role::Tool
      && message
        .tool_call_id
        .as_deref()
        .is_none_or(|id| !live_calls.contains(id))
    {
      *kept = false;
    }
  }
}

fn text_tokens(text: &str) -> u32 {
  let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
  chars.div_ceil(CHARS_PER_TOKEN)
}

/// Estimated prompt tokens of one message.
///
/// Reasoning text is not sent back to providers and is not counted.
pub fn estimate_message_tokens(message: &ChatMessage) -> u32 {
  let calls: u32 = message
    .tool_calls()
    .iter()
    .map(|call| text_tokens(&call.function.name) + text_tokens(&call.function.arguments))
    .sum();
  let images = u32::try_from(message.images.len())
    .unwrap_or(u32::MAX)
    .saturating_mul(IMAGE_TOKENS);

  MESSAGE_OVERHEAD_TOKENS
    .saturating_add(text_tokens(&message.content))
    .saturating_add(message.name.as_deref().map_or(0, text_tokens))
    .saturating_add(calls)
    .saturating_add(images)
}

/// Estimated prompt tokens of a conversation
pub fn estimate_tokens(messages: &[ChatMessage]) -> u32 {
  messages
    .iter()
    .map(estimate_message_tokens)
    .fold(0, u32::saturating_add)
}

fn estimate_tool_tokens(tools: &[ToolDefinition]) -> u32 {
  serde_json::to_string(tools)
    .map(|json| text_tokens(&json))
    .unwrap_or(0)
}

/// Tokens a request may consume: prompt plus requested output.
///
/// Used for local tokens-per-minute admission.
pub fn estimate_request_tokens(request: &CompletionRequest) -> u32 {
  estimate_tokens(&request.messages)
    .saturating_add(request.tools.as_deref().map_or(0, estimate_tool_tokens))
    .saturating_add(request.max_tokens.unwrap_or(0))
}

/// Render tool definitions as plain text for models without native tool
/// calling
pub fn describe_tools_for_prompt(tools: &[ToolDefinition]) -> String {
  let mut out = String::from(
    "You can use the following tools. To call one, reply with only a JSON object \
     of the form {\"tool\": \"<name>\", \"arguments\": {...}}.\n",
  );

  for tool in tools {
    let _ = write!(out, "\n- {}: {}", tool.name, tool.description);
    for (name, schema) in &tool.parameters.properties {
      let required = if tool.parameters.required.contains(name) {
        ", required"
      } else {
        ""
      };
      let _ = write!(out, "\n  - {name} ({}{required})", schema.kind);
      if let Some(description) = &schema.description {
        let _ = write!(out, ": {description}");
      }
      if let Some(allowed) = &schema.allowed {
        let _ = write!(out, " [one of: {}]", allowed.join(", "));
      }
    }
  }
  out.push('\n');
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use solace_config::{Model, Provider, ProviderCapabilities, SamplingDefaults};
  use solace_protocol::{ImageAttachment, PropertySchema, ToolCall};

  fn target(context_length: u32, max_output_tokens: u32) -> ResolvedModel {
    ResolvedModel {
      provider: Provider {
        id: "local".to_string(),
        name: "Local".to_string(),
        base_url: "http://localhost:8080/v1".to_string(),
        api_endpoint: "/chat/completions".to_string(),
        models_endpoint: "/models".to_string(),
        requires_api_key: false,
        api_key: None,
        api_key_env: None,
        enabled: true,
        capabilities: ProviderCapabilities::default(),
        headers: Default::default(),
        include_stream_usage: true,
        rate_limit: Default::default(),
      },
      model: Model {
        context_length,
        max_output_tokens,
        ..Model::new("local", "tiny")
      },
    }
  }

  fn mood_tool() -> ToolDefinition {
    ToolDefinition::new("log_mood", "Record the user's mood").property(
      "mood",
      PropertySchema::string()
        .describe("How the user feels")
        .one_of(&["calm", "anxious"]),
      true,
    )
  }

  /// 40 chars = 10 tokens + 4 overhead
  fn filler(role_fn: fn(String) -> ChatMessage, tag: char) -> ChatMessage {
    role_fn(std::iter::repeat_n(tag, 40).collect())
  }

  #[test]
  fn tools_on_model_without_tool_calling_are_rejected() {
    let options = RequestOptions {
      tools: Some(vec![mood_tool()]),
      ..RequestOptions::default()
    };

    let result = build(&target(8192, 1024), &[ChatMessage::user("hi")], &options);
    assert!(matches!(
      result,
      Err(ModelError::CapabilityUnsupported {
        capability: Capability::ToolCalling,
        ..
      })
    ));
  }

  #[test]
  fn images_need_vision() {
    let history = [ChatMessage::user("what is this")
      .with_image(ImageAttachment::from_url("https://example.com/cat.png"))];
    let result = build(&target(8192, 1024), &history, &RequestOptions::default());
    assert!(matches!(
      result,
      Err(ModelError::CapabilityUnsupported {
        capability: Capability::Vision,
        ..
      })
    ));
  }

  #[test]
  fn tools_are_sent_when_supported() {
    let mut target = target(8192, 1024);
    target.model.supports_tool_calling = true;
    let options = RequestOptions {
      tools: Some(vec![mood_tool()]),
      tool_choice: Some(ToolChoice::Auto),
      ..RequestOptions::default()
    };

    let request = build(&target, &[ChatMessage::user("hi")], &options).expect("build");
    assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
    assert_eq!(request.tool_choice, Some(ToolChoice::Auto));
  }

  #[test]
  fn oldest_non_system_messages_are_dropped_first() {
    // budget = 100 - min(40, 50) = 60 tokens; each filler costs 14
    let mut target = target(100, 40);
    target.model.defaults.max_tokens = Some(40);
    let history = vec![
      filler(ChatMessage::system, 's'),
      filler(ChatMessage::user, 'a'),
      filler(ChatMessage::assistant, 'b'),
      filler(ChatMessage::user, 'c'),
      filler(ChatMessage::assistant, 'd'),
      filler(ChatMessage::user, 'e'),
    ];

    let request = build(&target, &history, &RequestOptions::default()).expect("build");
    let kept: Vec<char> = request
      .messages
      .iter()
      .filter_map(|message| message.content.chars().next())
      .collect();
    assert_eq!(kept, vec!['s', 'c', 'd', 'e']);
    assert_eq!(request.messages[0].role, Role::System);
  }

  #[test]
  fn dropping_a_tool_call_drops_its_results() {
    let mut target = target(100, 40);
    target.model.defaults.max_tokens = Some(40);
    let history = vec![
      ChatMessage::system("be kind"),
      ChatMessage::assistant("")
        .with_tool_calls(vec![ToolCall::function("call_1", "recall", "{}")]),
      filler(|text| ChatMessage::tool("call_1", text), 't'),
      filler(ChatMessage::assistant, 'b'),
      filler(ChatMessage::user, 'c'),
      filler(ChatMessage::user, 'e'),
    ];

    let request = build(&target, &history, &RequestOptions::default()).expect("build");
    assert!(request.messages.iter().all(|m| m.role != Role::Tool));
    assert!(request.messages.iter().all(|m| m.tool_calls().is_empty()));
    assert_eq!(request.messages.len(), 4);
    assert_eq!(
      request.messages.last().map(|m| m.content.clone()),
      Some("e".repeat(40))
    );
  }

  #[test]
  fn oversized_last_user_message_overflows() {
    let history = vec![
      ChatMessage::system("be kind"),
      ChatMessage::user("x".repeat(1000)),
    ];
    let result = build(&target(200, 100), &history, &RequestOptions::default());
    assert!(matches!(result, Err(ModelError::ContextOverflow { .. })));
  }

  #[test]
  fn model_defaults_fill_unset_options_and_max_tokens_is_clamped() {
    let mut target = target(8192, 512);
    target.model.defaults = SamplingDefaults {
      temperature: Some(0.7),
      top_p: Some(0.9),
      ..SamplingDefaults::default()
    };
    let options = RequestOptions {
      temperature: Some(0.2),
      max_tokens: Some(4096),
      ..RequestOptions::default()
    };

    let request = build(&target, &[ChatMessage::user("hi")], &options).expect("build");
    assert_eq!(request.temperature, Some(0.2));
    assert_eq!(request.top_p, Some(0.9));
    assert_eq!(request.max_tokens, Some(512));
    assert!(request.stream);
  }

  #[test]
  fn non_streaming_models_never_get_stream_flag() {
    let mut target = target(8192, 512);
    target.model.supports_streaming = false;
    let request = build(&target, &[ChatMessage::user("hi")], &RequestOptions::default())
      .expect("build");
    assert!(!request.stream);
  }

  #[test]
  fn tool_description_lists_parameters() {
    let text = describe_tools_for_prompt(&[mood_tool()]);
    assert!(text.contains("- log_mood: Record the user's mood"));
    assert!(text.contains("mood (string, required): How the user feels [one of: calm, anxious]"));
  }

  #[test]
  fn token_estimate_counts_overhead_and_text() {
    assert_eq!(estimate_message_tokens(&ChatMessage::user("abcde")), 6);
    assert_eq!(estimate_tokens(&[]), 0);
  }
}
