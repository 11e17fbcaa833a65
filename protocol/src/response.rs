//! Non-streaming completion response

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::stream::StreamChunk;

/// Chat completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
  /// Unique identifier for this response
  pub id: String,

  /// Model that served the request
  pub model: String,

  /// List of completion choices
  pub choices: Vec<Choice>,

  /// Usage statistics
  #[serde(default)]
  pub usage: Option<Usage>,

  /// Unix timestamp of creation
  pub created: u64,
}

impl CompletionResponse {
  /// First choice's message, if any
  pub fn message(&self) -> Option<&ChatMessage> {
    self.choices.first().map(|choice| &choice.message)
  }

  /// Replays the first choice as the chunk sequence a stream would have
  /// produced, so streamed and non-streamed calls aggregate identically.
  pub fn into_chunks(self) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    if !self.model.is_empty() {
      chunks.push(StreamChunk::ModelInfo { model: self.model });
    }

    if let Some(choice) = self.choices.into_iter().next() {
      let message = choice.message;
      if let Some(reasoning) = message.reasoning.filter(|r| !r.is_empty()) {
        chunks.push(StreamChunk::Reasoning { text: reasoning });
      }
      if !message.content.is_empty() {
        chunks.push(StreamChunk::Content {
          text: message.content,
          first: true,
        });
      }
      for call in message.tool_calls.unwrap_or_default() {
        chunks.push(StreamChunk::ToolCallStart {
          id: call.id.clone(),
          name: call.function.name.clone(),
        });
        if !call.function.arguments.is_empty() {
          chunks.push(StreamChunk::ToolCallArguments {
            id: call.id.clone(),
            fragment: call.function.arguments.clone(),
          });
        }
        chunks.push(StreamChunk::ToolCallEnd { call });
      }
    }

    if let Some(usage) = self.usage {
      chunks.push(StreamChunk::Usage(usage));
    }
    chunks.push(StreamChunk::Done);
    chunks
  }
}

/// A completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
  /// Index of this choice
  pub index: u32,

  /// The message
  pub message: ChatMessage,

  /// Why the assistant stopped
  #[serde(default)]
  pub finish_reason: Option<FinishReason>,
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
  Stop,
  Length,
  ToolCalls,
  ContentFilter,
  #[serde(other)]
  Other,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
  /// Number of tokens in the prompt
  #[serde(default)]
  pub prompt_tokens: u32,

  /// Number of tokens in the completion
  #[serde(default)]
  pub completion_tokens: u32,

  /// Total tokens
  #[serde(default)]
  pub total_tokens: u32,

  /// Completion tokens spent on reasoning, when reported
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reasoning_tokens: Option<u32>,
}
