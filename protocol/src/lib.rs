//! Solace protocol types
//!
//! Provider-agnostic shapes shared by the completion client and its
//! consumers: conversation messages, tool calls, completion requests and
//! responses, and the incremental stream chunk union.

pub mod chat;
pub mod request;
pub mod response;
pub mod stream;

pub use chat::{
  ChatMessage, ImageAttachment, PropertySchema, Role, ToolCall, ToolCallFunction, ToolDefinition,
  ToolParameters,
};
pub use request::{CompletionRequest, ResponseFormat, ToolChoice};
pub use response::{Choice, CompletionResponse, FinishReason, Usage};
pub use stream::{ErrorKind, MessageStatus, StreamChunk, StreamError};
