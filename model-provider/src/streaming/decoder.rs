//! Chat completion delta decoding
//!
//! Turns SSE payloads of an OpenAI-compatible stream into `StreamChunk`s.

use serde_json::Value;
use solace_config::ReasoningFormat;
use solace_protocol::{StreamChunk, StreamError, ToolCall, Usage};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::streaming::reasoning::{Segment, ThinkTagSplitter};
use crate::wire::WireUsage;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug)]
enum ReasoningRoute {
  /// Reasoning fields are ignored, content passes through untouched
  Off,
  /// Reasoning arrives in a named delta field
  Field(String),
  /// Reasoning is wrapped in `<think>` tags inside content
  ThinkTags(ThinkTagSplitter),
}

/// Stateful decoder for one stream.
///
/// After a terminal chunk has been produced every further call returns
/// nothing.
#[derive(Debug)]
pub struct StreamDecoder {
  reasoning: ReasoningRoute,
  tool_calls: ToolCallAssembler,
  max_malformed: u32,
  malformed: u32,
  content_started: bool,
  model_reported: bool,
  finish_seen: bool,
  terminated: bool,
}

impl StreamDecoder {
  pub fn new(reasoning: ReasoningFormat, max_malformed: u32) -> Self {
    let reasoning = match reasoning {
      ReasoningFormat::None => ReasoningRoute::Off,
      ReasoningFormat::Field { field } => ReasoningRoute::Field(field),
      ReasoningFormat::ThinkTags => ReasoningRoute::ThinkTags(ThinkTagSplitter::default()),
    };
    Self {
      reasoning,
      tool_calls: ToolCallAssembler::default(),
      max_malformed,
      malformed: 0,
      content_started: false,
      model_reported: false,
      finish_seen: false,
      terminated: false,
    }
  }

  pub fn is_terminated(&self) -> bool {
    self.terminated
  }

  /// Decode one event payload
  pub fn decode_event(&mut self, data: &str) -> Vec<StreamChunk> {
    if self.terminated {
      return Vec::new();
    }

    let data = data.trim();
    if data == DONE_SENTINEL {
      return self.complete();
    }

    let value = match serde_json::from_str::<Value>(data) {
      Ok(value) => value,
      Err(err) => {
        self.malformed += 1;
        warn!(
          malformed = self.malformed,
          error = %err,
          "skipping malformed stream event"
        );
        if self.malformed > self.max_malformed {
          return self.fail(StreamError::protocol(format!(
            "{} malformed stream events",
            self.malformed
          )));
        }
        return Vec::new();
      }
    };

    if let Some(error) = ApiError::from_json(&value) {
      return self.fail(error.to_stream_error());
    }

    let mut chunks = Vec::new();

    if !self.model_reported {
      if let Some(model) = value.get("model").and_then(Value::as_str).filter(|m| !m.is_empty()) {
        self.model_reported = true;
        chunks.push(StreamChunk::ModelInfo {
          model: model.to_string(),
        });
      }
    }

    let choice = value
      .get("choices")
      .and_then(Value::as_array)
      .and_then(|choices| choices.first());
    if let Some(choice) = choice {
      if let Some(delta) = choice.get("delta") {
        self.decode_delta(delta, &mut chunks);
        if let Some(StreamChunk::Error(_)) = chunks.last() {
          self.terminated = true;
          return chunks;
        }
      }

      let finished = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .is_some_and(|reason| !reason.is_empty());
      if finished && !self.finish_seen {
        self.finish_seen = true;
        self.flush(&mut chunks);
      }
    }

    if let Some(usage) = value.get("usage").filter(|usage| usage.is_object()) {
      match serde_json::from_value::<WireUsage>(usage.clone()) {
        Ok(usage) => chunks.push(StreamChunk::Usage(Usage::from(usage))),
        Err(err) => debug!(error = %err, "ignoring unreadable usage block"),
      }
    }

    chunks
  }

  /// The response body ended
  pub fn finish(&mut self) -> Vec<StreamChunk> {
    if self.terminated {
      return Vec::new();
    }
    if self.finish_seen {
      return self.complete();
    }
    self.fail(StreamError::transport(
      "connection closed before the response completed",
    ))
  }

  fn decode_delta(&mut self, delta: &Value, chunks: &mut Vec<StreamChunk>) {
    if let ReasoningRoute::Field(field) = &self.reasoning {
      if let Some(text) = delta.get(field).and_then(Value::as_str).filter(|t| !t.is_empty()) {
        chunks.push(StreamChunk::Reasoning {
          text: text.to_string(),
        });
      }
    }

    if let Some(text) = delta.get("content").and_then(Value::as_str).filter(|t| !t.is_empty()) {
      let segments = match &mut self.reasoning {
        ReasoningRoute::ThinkTags(splitter) => splitter.push(text),
        _ => vec![Segment::Content(text.to_string())],
      };
      self.push_segments(segments, chunks);
    }

    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
      for (position, call) in calls.iter().enumerate() {
        match self.tool_calls.apply(position, call) {
          Ok(mut produced) => chunks.append(&mut produced),
          Err(error) => {
            chunks.push(StreamChunk::Error(error));
            return;
          }
        }
      }
    }
  }

  fn push_segments(&mut self, segments: Vec<Segment>, chunks: &mut Vec<StreamChunk>) {
    for segment in segments {
      match segment {
        Segment::Content(text) => {
          let first = !self.content_started;
          self.content_started = true;
          chunks.push(StreamChunk::Content { text, first });
        }
        Segment::Reasoning(text) => chunks.push(StreamChunk::Reasoning { text }),
      }
    }
  }

  /// Release held-back think text and close open tool calls
  fn flush(&mut self, chunks: &mut Vec<StreamChunk>) {
    if let ReasoningRoute::ThinkTags(splitter) = &mut self.reasoning {
      let segments = splitter.finish();
      self.push_segments(segments, chunks);
    }
    chunks.extend(self.tool_calls.close_all());
  }

  fn complete(&mut self) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    self.flush(&mut chunks);
    chunks.push(StreamChunk::Done);
    self.terminated = true;
    chunks
  }

  fn fail(&mut self, error: StreamError) -> Vec<StreamChunk> {
    self.terminated = true;
    vec![StreamChunk::Error(error)]
  }
}

#[derive(Debug)]
struct OpenCall {
  id: String,
  index: u64,
  name: String,
  arguments: String,
}

/// Assembles OpenAI index-keyed tool-call deltas into id-keyed
/// start/arguments/end chunks.
///
/// Fragments are buffered per call id in arrival order, so interleaved
/// deltas for several calls assemble independently.
#[derive(Debug, Default)]
struct ToolCallAssembler {
  open: Vec<OpenCall>,
}

impl ToolCallAssembler {
  fn apply(&mut self, position: usize, delta: &Value) -> Result<Vec<StreamChunk>, StreamError> {
    let index = delta
      .get("index")
      .and_then(Value::as_u64)
      .unwrap_or(position as u64);
    let id = delta
      .get("id")
      .and_then(Value::as_str)
      .filter(|id| !id.is_empty());
    let function = delta.get("function");
    let name = function
      .and_then(|f| f.get("name"))
      .and_then(Value::as_str)
      .filter(|name| !name.is_empty());
    let fragment = function
      .and_then(|f| f.get("arguments"))
      .and_then(Value::as_str)
      .unwrap_or_default();

    let existing = match id {
      Some(id) => self.open.iter().position(|call| call.id == id),
      None => self.open.iter().position(|call| call.index == index),
    };

    let mut chunks = Vec::new();
    let slot = match existing {
      Some(slot) => slot,
      None if id.is_some() || name.is_some() => {
        let id = id.map_or_else(
          || format!("call_{}", uuid::Uuid::new_v4().simple()),
          str::to_string,
        );
        let name = name.unwrap_or_default().to_string();
        chunks.push(StreamChunk::ToolCallStart {
          id: id.clone(),
          name: name.clone(),
        });
        self.open.push(OpenCall {
          id,
          index,
          name,
          arguments: String::new(),
        });
        self.open.len() - 1
      }
      None => {
        return Err(StreamError::protocol(format!(
          "tool call arguments for unknown call at index {index}"
        )));
      }
    };

    if !fragment.is_empty() {
      let call = &mut self.open[slot];
      call.arguments.push_str(fragment);
      chunks.push(StreamChunk::ToolCallArguments {
        id: call.id.clone(),
        fragment: fragment.to_string(),
      });
    }
    Ok(chunks)
  }

  /// Finalize open calls in start order
  fn close_all(&mut self) -> Vec<StreamChunk> {
    self
      .open
      .drain(..)
      .map(|call| StreamChunk::ToolCallEnd {
        call: ToolCall::function(call.id, call.name, call.arguments),
      })
      .collect()
  }
}
