//! Response Aggregator
//!
//! Forwards every chunk to a live consumer as it arrives and folds the same
//! ordered sequence into the final assistant message.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use solace_protocol::{ChatMessage, MessageStatus, StreamChunk, StreamError, ToolCall, Usage};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry::RetryEvent;

/// Incremental update for a live view of the turn
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
  Chunk(StreamChunk),
  /// Everything shown for the failed attempt must be cleared; a fresh
  /// attempt starts after `delay`
  Reset {
    attempt: u32,
    delay: Duration,
    error: StreamError,
  },
}

/// Output received before a turn failed or was cancelled
#[derive(Debug, Clone, PartialEq)]
pub enum PartialOutput {
  None,
  Partial(ChatMessage),
}

impl PartialOutput {
  pub fn message(&self) -> Option<&ChatMessage> {
    match self {
      PartialOutput::None => None,
      PartialOutput::Partial(message) => Some(message),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTurn {
  /// Finalized assistant message
  pub message: ChatMessage,
  /// Last usage report, if the provider sent one
  pub usage: Option<Usage>,
  /// Model that served the turn
  pub model: String,
  pub attempts: u32,
  pub elapsed: Duration,
  pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedTurn {
  pub error: StreamError,
  pub partial: PartialOutput,
  pub attempts: u32,
  pub elapsed: Duration,
}

/// Final result of a turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
  Completed(CompletedTurn),
  Failed(FailedTurn),
  Cancelled { partial: PartialOutput },
}

impl TurnOutcome {
  /// Status to persist with the assistant message
  pub fn status(&self) -> MessageStatus {
    match self {
      TurnOutcome::Completed(_) => MessageStatus::Complete,
      TurnOutcome::Failed(_) => MessageStatus::Failed,
      TurnOutcome::Cancelled { .. } => MessageStatus::Cancelled,
    }
  }

  /// Message worth persisting, complete or partial
  pub fn message(&self) -> Option<&ChatMessage> {
    match self {
      TurnOutcome::Completed(turn) => Some(&turn.message),
      TurnOutcome::Failed(turn) => turn.partial.message(),
      TurnOutcome::Cancelled { partial } => partial.message(),
    }
  }
}

/// Folds one turn's `RetryEvent`s into a `TurnOutcome`
pub struct ResponseAggregator<F> {
  on_update: F,
  requested_model: String,
  content: String,
  reasoning: String,
  tool_calls: Vec<ToolCall>,
  usage: Option<Usage>,
  served_model: Option<String>,
  attempts: u32,
  started: Instant,
}

impl<F: FnMut(LiveUpdate)> ResponseAggregator<F> {
  pub fn new(requested_model: impl Into<String>, on_update: F) -> Self {
    Self {
      on_update,
      requested_model: requested_model.into(),
      content: String::new(),
      reasoning: String::new(),
      tool_calls: Vec::new(),
      usage: None,
      served_model: None,
      attempts: 1,
      started: Instant::now(),
    }
  }

  /// Drive `events` to completion, stopping early when `cancel` fires
  pub async fn run<S>(mut self, events: S, cancel: &CancellationToken) -> TurnOutcome
  where
    S: Stream<Item = RetryEvent> + Unpin,
  {
    let mut events = events;
    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => return self.cancel(),
        event = events.next() => match event {
          Some(event) => {
            if let Some(outcome) = self.observe(event) {
              return outcome;
            }
          }
          None => {
            return self.fail(StreamError::transport("stream closed before the response completed"));
          }
        },
      }
    }
  }

  /// Apply one event; returns the outcome once the turn is over
  pub fn observe(&mut self, event: RetryEvent) -> Option<TurnOutcome> {
    match event {
      RetryEvent::Retrying {
        attempt,
        delay,
        error,
      } => {
        debug!(attempt, discarded_chars = self.content.len(), "discarding failed attempt");
        self.reset();
        self.attempts = attempt + 1;
        (self.on_update)(LiveUpdate::Reset {
          attempt,
          delay,
          error,
        });
        None
      }
      RetryEvent::Chunk(chunk) => {
        (self.on_update)(LiveUpdate::Chunk(chunk.clone()));
        self.apply(chunk)
      }
    }
  }

  fn apply(&mut self, chunk: StreamChunk) -> Option<TurnOutcome> {
    match chunk {
      StreamChunk::Content { text, .. } => self.content.push_str(&text),
      StreamChunk::Reasoning { text } => self.reasoning.push_str(&text),
      StreamChunk::ToolCallStart { .. } | StreamChunk::ToolCallArguments { .. } => {}
      StreamChunk::ToolCallEnd { call } => self.tool_calls.push(call),
      StreamChunk::Usage(usage) => self.usage = Some(usage),
      StreamChunk::ModelInfo { model } => self.served_model = Some(model),
      StreamChunk::Error(error) => return Some(self.fail(error)),
      StreamChunk::Done => return Some(self.complete()),
    }
    None
  }

  /// Stop now, keeping whatever arrived
  pub fn cancel(&mut self) -> TurnOutcome {
    debug!(attempts = self.attempts, "turn cancelled");
    TurnOutcome::Cancelled {
      partial: self.partial(),
    }
  }

  fn reset(&mut self) {
    self.content.clear();
    self.reasoning.clear();
    self.tool_calls.clear();
    self.usage = None;
    self.served_model = None;
  }

  fn message(&mut self) -> ChatMessage {
    let mut message = ChatMessage::assistant(std::mem::take(&mut self.content))
      .with_tool_calls(std::mem::take(&mut self.tool_calls));
    if !self.reasoning.is_empty() {
      message = message.with_reasoning(std::mem::take(&mut self.reasoning));
    }
    message
  }

  fn partial(&mut self) -> PartialOutput {
    let message = self.message();
    if message.is_empty() {
      PartialOutput::None
    } else {
      PartialOutput::Partial(message)
    }
  }

  fn fail(&mut self, error: StreamError) -> TurnOutcome {
    TurnOutcome::Failed(FailedTurn {
      error,
      partial: self.partial(),
      attempts: self.attempts,
      elapsed: self.started.elapsed(),
    })
  }

  fn complete(&mut self) -> TurnOutcome {
    TurnOutcome::Completed(CompletedTurn {
      message: self.message(),
      usage: self.usage,
      model: self
        .served_model
        .take()
        .unwrap_or_else(|| self.requested_model.clone()),
      attempts: self.attempts,
      elapsed: self.started.elapsed(),
      finished_at: Utc::now(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures::stream;
  use pretty_assertions::assert_eq;
  use solace_protocol::ErrorKind;

  fn content(text: &str, first: bool) -> RetryEvent {
    RetryEvent::Chunk(StreamChunk::Content {
      text: text.to_string(),
      first,
    })
  }

  fn run_events(events: Vec<RetryEvent>) -> (TurnOutcome, Vec<LiveUpdate>) {
    let mut updates = Vec::new();
    let outcome = {
      let mut aggregator = ResponseAggregator::new("m", |update| updates.push(update));
      events
        .into_iter()
        .find_map(|event| aggregator.observe(event))
        .expect("terminal event")
    };
    (outcome, updates)
  }

  #[test]
  fn content_and_reasoning_concatenate_in_order() {
    let (outcome, updates) = run_events(vec![
      RetryEvent::Chunk(StreamChunk::Reasoning {
        text: "think ".to_string(),
      }),
      content("Hello", true),
      RetryEvent::Chunk(StreamChunk::Reasoning {
        text: "more".to_string(),
      }),
      content(" world", false),
      RetryEvent::Chunk(StreamChunk::Done),
    ]);

    assert_eq!(updates.len(), 5);
    match outcome {
      TurnOutcome::Completed(turn) => {
        assert_eq!(turn.message.content, "Hello world");
        assert_eq!(turn.message.reasoning.as_deref(), Some("think more"));
        assert_eq!(turn.model, "m");
        assert_eq!(turn.attempts, 1);
      }
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[test]
  fn retry_discards_partial_output_and_emits_reset() {
    let error = StreamError::transport("reset by peer");
    let (outcome, updates) = run_events(vec![
      content("Hi", true),
      RetryEvent::Retrying {
        attempt: 1,
        delay: Duration::from_secs(1),
        error: error.clone(),
      },
      content("Hi there", true),
      RetryEvent::Chunk(StreamChunk::Done),
    ]);

    assert!(updates.contains(&LiveUpdate::Reset {
      attempt: 1,
      delay: Duration::from_secs(1),
      error,
    }));
    match outcome {
      TurnOutcome::Completed(turn) => {
        assert_eq!(turn.message.content, "Hi there");
        assert_eq!(turn.attempts, 2);
      }
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[test]
  fn last_usage_and_served_model_win() {
    let usage = |total| Usage {
      total_tokens: total,
      ..Usage::default()
    };
    let (outcome, _) = run_events(vec![
      RetryEvent::Chunk(StreamChunk::ModelInfo {
        model: "gpt-4o-2024-08-06".to_string(),
      }),
      RetryEvent::Chunk(StreamChunk::Usage(usage(3))),
      RetryEvent::Chunk(StreamChunk::Usage(usage(9))),
      RetryEvent::Chunk(StreamChunk::ToolCallEnd {
        call: ToolCall::function("call_1", "recall", "{}"),
      }),
      RetryEvent::Chunk(StreamChunk::Done),
    ]);

    match outcome {
      TurnOutcome::Completed(turn) => {
        assert_eq!(turn.usage.map(|u| u.total_tokens), Some(9));
        assert_eq!(turn.model, "gpt-4o-2024-08-06");
        assert_eq!(turn.message.tool_calls().len(), 1);
      }
      other => panic!("expected completion, got {other:?}"),
    }
  }

  #[test]
  fn failure_distinguishes_empty_from_partial() {
    let fatal = || {
      RetryEvent::Chunk(StreamChunk::Error(StreamError::new(
        ErrorKind::Auth,
        "bad key",
        false,
      )))
    };

    let (outcome, _) = run_events(vec![fatal()]);
    assert_eq!(outcome.status(), MessageStatus::Failed);
    assert!(matches!(
      outcome,
      TurnOutcome::Failed(FailedTurn {
        partial: PartialOutput::None,
        ..
      })
    ));

    let (outcome, _) = run_events(vec![content("Half an ans", true), fatal()]);
    assert_eq!(outcome.message().map(|m| m.content.as_str()), Some("Half an ans"));
  }

  #[tokio::test]
  async fn cancellation_keeps_partial_output() {
    let cancel = CancellationToken::new();
    let (tx, rx) = futures::channel::mpsc::unbounded();
    tx.unbounded_send(content("Once upon", true)).expect("send");

    let trigger = cancel.clone();
    let aggregator = ResponseAggregator::new("m", move |update| {
      if matches!(update, LiveUpdate::Chunk(StreamChunk::Content { .. })) {
        trigger.cancel();
      }
    });
    let outcome = aggregator.run(rx, &cancel).await;

    assert_eq!(outcome.status(), MessageStatus::Cancelled);
    assert_eq!(outcome.message().map(|m| m.content.as_str()), Some("Once upon"));
    drop(tx);
  }

  #[tokio::test]
  async fn closed_event_stream_is_a_failure() {
    let outcome = ResponseAggregator::new("m", |_| {})
      .run(stream::iter(vec![content("x", true)]), &CancellationToken::new())
      .await;
    assert!(matches!(
      outcome,
      TurnOutcome::Failed(FailedTurn { error, .. }) if error.kind == ErrorKind::Transport
    ));
  }
}
