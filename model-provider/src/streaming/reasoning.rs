//! Inline `<think>` span splitting
//!
//! Some local reasoning models put their thinking inside the content field,
//! wrapped in `<think>...</think>`. Tags may be split across deltas, so a
//! possible partial tag at the end of a delta is held back until the next
//! one arrives.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Text routed to one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Content(String),
  Reasoning(String),
}

#[derive(Debug, Default)]
pub struct ThinkTagSplitter {
  pending: String,
  inside: bool,
  /// Newlines right after `</think>` are formatting, not answer text
  trim_leading_newlines: bool,
}

impl ThinkTagSplitter {
  pub fn push(&mut self, text: &str) -> Vec<Segment> {
    self.pending.push_str(text);
    let mut segments = Vec::new();

    loop {
      let tag = if self.inside { CLOSE_TAG } else { OPEN_TAG };
      match self.pending.find(tag) {
        Some(pos) => {
          let before: String = self.pending.drain(..pos).collect();
          self.pending.drain(..tag.len());
          self.emit(before, &mut segments);
          self.inside = !self.inside;
          if !self.inside {
            self.trim_leading_newlines = true;
          }
        }
        None => {
          let hold = partial_tag_suffix(&self.pending, tag);
          let ready: String = self.pending.drain(..self.pending.len() - hold).collect();
          self.emit(ready, &mut segments);
          return segments;
        }
      }
    }
  }

  /// Flush held-back text at end of stream
  pub fn finish(&mut self) -> Vec<Segment> {
    let rest = std::mem::take(&mut self.pending);
    let mut segments = Vec::new();
    self.emit(rest, &mut segments);
    segments
  }

  fn emit(&mut self, mut text: String, segments: &mut Vec<Segment>) {
    if !self.inside && self.trim_leading_newlines {
      let trimmed = text.trim_start_matches(['\n', '\r']);
      if trimmed.is_empty() {
        return;
      }
      text = trimmed.to_string();
      self.trim_leading_newlines = false;
    }
    if text.is_empty() {
      return;
    }
    segments.push(if self.inside {
      Segment::Reasoning(text)
    } else {
      Segment::Content(text)
    });
  }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
  (1..tag.len())
    .rev()
    .find(|&len| text.ends_with(&tag[..len]))
    .unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn run(deltas: &[&str]) -> (String, String) {
    let mut splitter = ThinkTagSplitter::default();
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut segments: Vec<Segment> = deltas.iter().flat_map(|d| splitter.push(d)).collect();
    segments.extend(splitter.finish());
    for segment in segments {
      match segment {
        Segment::Content(text) => content.push_str(&text),
        Segment::Reasoning(text) => reasoning.push_str(&text),
      }
    }
    (content, reasoning)
  }

  #[test]
  fn tags_split_across_deltas() {
    let (content, reasoning) = run(&["<thi", "nk>let me ", "see</th", "ink>\n\nThe answer", " is 4"]);
    assert_eq!(reasoning, "let me see");
    assert_eq!(content, "The answer is 4");
  }

  #[test]
  fn text_without_tags_is_content() {
    assert_eq!(
      run(&["a < b", " and <b>bold</b>"]),
      ("a < b and <b>bold</b>".to_string(), String::new())
    );
  }

  #[test]
  fn held_back_partial_tag_is_flushed_at_finish() {
    assert_eq!(run(&["ends with <thi"]), ("ends with <thi".to_string(), String::new()));
  }

  #[test]
  fn unclosed_think_stays_reasoning() {
    assert_eq!(
      run(&["<think>still going"]),
      (String::new(), "still going".to_string())
    );
  }
}
