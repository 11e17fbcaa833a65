//! Server-sent event framing
//!
//! Splits a byte stream into event payloads. Lines end in LF or CRLF, `data:`
//! lines of one event are joined with `\n`, comment lines and the `event`,
//! `id` and `retry` fields are ignored, and a blank line dispatches.

/// Incremental SSE parser
#[derive(Debug, Default)]
pub struct SseParser {
  buffer: Vec<u8>,
  data: Vec<String>,
}

impl SseParser {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feed raw bytes; returns the data payload of every completed event
  pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
    self.buffer.extend_from_slice(bytes);
    let mut events = Vec::new();

    while let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
      let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
      line.pop();
      if line.last() == Some(&b'\r') {
        line.pop();
      }
      self.process_line(&String::from_utf8_lossy(&line), &mut events);
    }

    events
  }

  /// Flush an unterminated last line and any pending event
  pub fn finish(&mut self) -> Vec<String> {
    let mut events = Vec::new();
    if !self.buffer.is_empty() {
      let line = std::mem::take(&mut self.buffer);
      let text = String::from_utf8_lossy(&line);
      self.process_line(text.trim_end_matches('\r'), &mut events);
    }
    self.dispatch(&mut events);
    events
  }

  fn process_line(&mut self, line: &str, events: &mut Vec<String>) {
    if line.is_empty() {
      self.dispatch(events);
      return;
    }
    if line.starts_with(':') {
      return;
    }

    let (field, value) = match line.split_once(':') {
      Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
      None => (line, ""),
    };
    if field == "data" {
      self.data.push(value.to_string());
    }
  }

  fn dispatch(&mut self, events: &mut Vec<String>) {
    if !self.data.is_empty() {
      events.push(std::mem::take(&mut self.data).join("\n"));
    }
  }
}
