//! Conversation message types
//!
//! A conversation is an ordered `Vec<ChatMessage>` sent in full on every
//! request; nothing is kept server-side between turns.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
  Tool,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::System => "system",
      Role::User => "user",
      Role::Assistant => "assistant",
      Role::Tool => "tool",
    }
  }
}

/// Protocol-level chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  /// Who produced the message
  pub role: Role,

  /// Text content (may be empty for tool-call-only assistant turns)
  #[serde(default)]
  pub content: String,

  /// Optional participant name
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  /// Intermediate "thinking" text emitted by reasoning models
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reasoning: Option<String>,

  /// Images attached for vision-capable models
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub images: Vec<ImageAttachment>,

  /// Tool invocations requested by the assistant
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool_calls: Option<Vec<ToolCall>>,

  /// Call this message answers (role = tool)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool_call_id: Option<String>,
}

impl ChatMessage {
  fn new(role: Role, content: impl Into<String>) -> Self {
    Self {
      role,
      content: content.into(),
      name: None,
      reasoning: None,
      images: Vec::new(),
      tool_calls: None,
      tool_call_id: None,
    }
  }

  /// Create a system message
  pub fn system(content: impl Into<String>) -> Self {
    Self::new(Role::System, content)
  }

  /// Create a user message
  pub fn user(content: impl Into<String>) -> Self {
    Self::new(Role::User, content)
  }

  /// Create an assistant message
  pub fn assistant(content: impl Into<String>) -> Self {
    Self::new(Role::Assistant, content)
  }

  /// Create a tool result message
  pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      tool_call_id: Some(tool_call_id.into()),
      ..Self::new(Role::Tool, content)
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
    self.reasoning = Some(reasoning.into());
    self
  }

  pub fn with_image(mut self, image: ImageAttachment) -> Self {
    self.images.push(image);
    self
  }

  pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
    self.tool_calls = if tool_calls.is_empty() {
      None
    } else {
      Some(tool_calls)
    };
    self
  }

  /// Tool calls on this message, empty when there are none
  pub fn tool_calls(&self) -> &[ToolCall] {
    self.tool_calls.as_deref().unwrap_or_default()
  }

  pub fn has_images(&self) -> bool {
    !self.images.is_empty()
  }

  /// True when the message carries nothing a model could act on
  pub fn is_empty(&self) -> bool {
    self.content.is_empty()
      && self.reasoning.as_deref().is_none_or(str::is_empty)
      && self.tool_calls().is_empty()
  }
}

/// Image attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
  /// Remote URL or `data:` URL
  pub url: String,

  /// Provider detail hint ("low", "high", "auto")
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

impl ImageAttachment {
  pub fn from_url(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      detail: None,
    }
  }

  /// Inline raw image bytes as a base64 data URL
  pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
    Self {
      url: format!("data:{mime_type};base64,{}", STANDARD.encode(bytes)),
      detail: None,
    }
  }
}

/// Tool call made by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
  /// ID of this tool call
  pub id: String,

  /// Type of tool call (currently only "function")
  #[serde(rename = "type", default = "function_call_type")]
  pub call_type: String,

  /// The function to call
  pub function: ToolCallFunction,
}

impl ToolCall {
  pub fn function(
    id: impl Into<String>,
    name: impl Into<String>,
    arguments: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      call_type: "function".to_string(),
      function: ToolCallFunction {
        name: name.into(),
        arguments: arguments.into(),
      },
    }
  }

  /// Parse the arguments as JSON.
  ///
  /// The client never does this itself; the argument string belongs to the
  /// tool executor.
  pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
    serde_json::from_str(&self.function.arguments)
  }
}

fn function_call_type() -> String {
  "function".to_string()
}

/// Function call in a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFunction {
  /// Name of the function
  pub name: String,

  /// Arguments as a JSON string
  pub arguments: String,
}

/// Tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
  pub name: String,
  pub description: String,
  pub parameters: ToolParameters,
}

impl ToolDefinition {
  pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
      parameters: ToolParameters::default(),
    }
  }

  /// Add a typed property; `required` appends it to the required list
  pub fn property(mut self, name: &str, schema: PropertySchema, required: bool) -> Self {
    self.parameters.properties.insert(name.to_string(), schema);
    if required {
      self.parameters.required.push(name.to_string());
    }
    self
  }
}

/// JSON-schema-like parameter spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
  #[serde(rename = "type")]
  pub schema_type: String,

  #[serde(default)]
  pub properties: BTreeMap<String, PropertySchema>,

  #[serde(default)]
  pub required: Vec<String>,

  #[serde(rename = "additionalProperties", default)]
  pub additional_properties: bool,
}

impl Default for ToolParameters {
  fn default() -> Self {
    Self {
      schema_type: "object".to_string(),
      properties: BTreeMap::new(),
      required: Vec::new(),
      additional_properties: false,
    }
  }
}

/// Schema for a single tool parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
  #[serde(rename = "type")]
  pub kind: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
  pub allowed: Option<Vec<String>>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
  pub fn new(kind: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      description: None,
      allowed: None,
      items: None,
    }
  }

  pub fn string() -> Self {
    Self::new("string")
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn one_of(mut self, values: &[&str]) -> Self {
    self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn tool_message_carries_call_id() {
    let msg = ChatMessage::tool("call_1", "done");
    assert_eq!(msg.role, Role::Tool);
    assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
  }

  #[test]
  fn empty_tool_call_list_is_normalized_to_none() {
    let msg = ChatMessage::assistant("hi").with_tool_calls(Vec::new());
    assert!(msg.tool_calls.is_none());
    assert!(msg.tool_calls().is_empty());
  }

  #[test]
  fn image_bytes_become_data_url() {
    let image = ImageAttachment::from_bytes("image/png", b"abc");
    assert_eq!(image.url, "data:image/png;base64,YWJj");
  }

  #[test]
  fn tool_definition_serializes_as_json_schema() {
    let tool = ToolDefinition::new("log_mood", "Record the user's mood").property(
      "mood",
      PropertySchema::string().one_of(&["calm", "anxious"]),
      true,
    );

    let json = serde_json::to_value(&tool.parameters).expect("serialize parameters");
    assert_eq!(
      json,
      serde_json::json!({
        "type": "object",
        "properties": {"mood": {"type": "string", "enum": ["calm", "anxious"]}},
        "required": ["mood"],
        "additionalProperties": false
      })
    );
  }
}
