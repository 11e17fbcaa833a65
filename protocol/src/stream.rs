use derive_more::IsVariant;
use serde::{Deserialize, Serialize};

use crate::chat::ToolCall;
use crate::response::Usage;

/// Incremental unit of a streamed completion.
///
/// Exactly one `Done` or one `Error` terminates a stream and nothing
/// follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IsVariant)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
  /// Incremental assistant text; `first` marks the first content chunk
  Content { text: String, first: bool },
  /// Incremental "thinking" text
  Reasoning { text: String },
  /// Opens the argument buffer for a tool call
  ToolCallStart { id: String, name: String },
  /// Next fragment of a tool call's JSON argument string
  ToolCallArguments { id: String, fragment: String },
  /// Finalized tool call, arguments fully concatenated
  ToolCallEnd { call: ToolCall },
  /// Token counts; the last one seen is authoritative
  Usage(Usage),
  /// Echo of the serving model id
  ModelInfo { model: String },
  /// Terminal failure
  Error(StreamError),
  /// Terminal success
  Done,
}

impl StreamChunk {
  pub fn is_terminal(&self) -> bool {
    matches!(self, StreamChunk::Done | StreamChunk::Error(_))
  }
}

/// Failure category carried by an `Error` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Connection refused/reset, idle stall, dropped before completion
  Transport,
  /// Malformed or orphaned stream events
  ProtocolViolation,
  /// 429 or provider rate-limit error
  RateLimited,
  /// 401/403; a configuration problem, never transient
  Auth,
  /// 5xx
  Server,
  /// Other 4xx; the request itself is wrong
  Client,
  /// Total request deadline exceeded
  Timeout,
}

/// Error payload of a terminal `Error` chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
  pub message: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,

  pub kind: ErrorKind,

  pub retryable: bool,

  /// HTTP status when the failure came from a response status line
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<u16>,

  /// Server-supplied retry delay
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_after_ms: Option<u64>,
}

impl StreamError {
  pub fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
    Self {
      message: message.into(),
      code: None,
      kind,
      retryable,
      status: None,
      retry_after_ms: None,
    }
  }

  /// Retryable connection-level failure
  pub fn transport(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Transport, message, true)
  }

  /// Fatal protocol violation
  pub fn protocol(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::ProtocolViolation, message, false)
  }

  /// Fatal total-deadline expiry
  pub fn timeout(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Timeout, message, false)
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.code = Some(code.into());
    self
  }

  pub fn with_status(mut self, status: u16) -> Self {
    self.status = Some(status);
    self
  }

  pub fn with_retry_after_ms(mut self, retry_after_ms: Option<u64>) -> Self {
    self.retry_after_ms = retry_after_ms;
    self
  }

  pub fn is_auth_error(&self) -> bool {
    self.kind == ErrorKind::Auth
  }
}

impl std::fmt::Display for StreamError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (self.status, &self.code) {
      (Some(status), Some(code)) => write!(f, "HTTP {status} ({code}): {}", self.message),
      (Some(status), None) => write!(f, "HTTP {status}: {}", self.message),
      (None, Some(code)) => write!(f, "{code}: {}", self.message),
      (None, None) => f.write_str(&self.message),
    }
  }
}

/// Delivery state of an assistant message, as persisted by the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
  Complete,
  Failed,
  Cancelled,
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn stream_chunk_roundtrip_content() {
    let chunk = StreamChunk::Content {
      text: "hello".to_string(),
      first: true,
    };

    let json = serde_json::to_string(&chunk).expect("serialize chunk");
    assert_eq!(json, r#"{"type":"content","text":"hello","first":true}"#);
    let parsed: StreamChunk = serde_json::from_str(&json).expect("deserialize chunk");
    assert_eq!(parsed, chunk);
  }

  #[test]
  fn stream_chunk_roundtrip_error() {
    let chunk = StreamChunk::Error(
      StreamError::transport("connection reset")
        .with_status(502)
        .with_retry_after_ms(Some(250)),
    );

    let json = serde_json::to_string(&chunk).expect("serialize chunk");
    let parsed: StreamChunk = serde_json::from_str(&json).expect("deserialize chunk");
    assert_eq!(parsed, chunk);
  }

  #[test]
  fn only_done_and_error_are_terminal() {
    assert!(StreamChunk::Done.is_terminal());
    assert!(StreamChunk::Error(StreamError::protocol("bad")).is_terminal());
    assert!(
      !StreamChunk::Reasoning {
        text: "hmm".to_string()
      }
      .is_terminal()
    );
  }

  #[test]
  fn error_display_includes_status_and_code() {
    let err = StreamError::new(ErrorKind::Client, "model not found", false)
      .with_status(404)
      .with_code("model_not_found");
    assert_eq!(err.to_string(), "HTTP 404 (model_not_found): model not found");
  }
}
