#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use pretty_assertions::assert_eq;
use solace_config::{AiConfig, Provider};
use solace_model_provider::{
  ChatTurn, ChunkStream, CompletionClient, CompletionTransport, LiveUpdate, PartialOutput,
  ProviderRegistry, ResolvedModel, TurnOutcome,
};
use solace_protocol::{ChatMessage, CompletionRequest, MessageStatus, StreamChunk, StreamError, ToolCall};
use tokio_util::sync::CancellationToken;

/// Replays one scripted attempt per `open`; an attempt marked open-ended
/// never finishes.
#[derive(Default)]
struct ScriptedTransport {
  attempts: Mutex<VecDeque<(Vec<StreamChunk>, bool)>>,
  requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedTransport {
  fn new(attempts: Vec<Vec<StreamChunk>>) -> Self {
    Self {
      attempts: Mutex::new(attempts.into_iter().map(|chunks| (chunks, false)).collect()),
      requests: Mutex::default(),
    }
  }

  fn open_ended(chunks: Vec<StreamChunk>) -> Self {
    Self {
      attempts: Mutex::new(VecDeque::from([(chunks, true)])),
      requests: Mutex::default(),
    }
  }

  fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
  fn open(&self, request: CompletionRequest, _target: ResolvedModel) -> ChunkStream {
    self.requests.lock().unwrap().push(request);
    let (chunks, open_ended) = self
      .attempts
      .lock()
      .unwrap()
      .pop_front()
      .expect("no scripted attempt left");
    if open_ended {
      Box::pin(stream::iter(chunks).chain(stream::pending()))
    } else {
      Box::pin(stream::iter(chunks))
    }
  }

  async fn list_models(&self, _provider: &Provider) -> solace_model_provider::Result<Vec<String>> {
    Ok(Vec::new())
  }
}

fn registry() -> Arc<ProviderRegistry> {
  Arc::new(ProviderRegistry::from_config(&AiConfig::default()).expect("registry"))
}

fn content(text: &str, first: bool) -> StreamChunk {
  StreamChunk::Content {
    text: text.to_string(),
    first,
  }
}

fn turn() -> ChatTurn {
  ChatTurn::new(vec![ChatMessage::user("Greet me")]).with_model("ollama/qwen3")
}

#[tokio::test(start_paused = true)]
async fn dropped_connection_restarts_the_turn() {
  let transport = Arc::new(ScriptedTransport::new(vec![
    vec![
      content("Hi", true),
      StreamChunk::Error(StreamError::transport("connection reset")),
    ],
    vec![content("Hi there", true), StreamChunk::Done],
  ]));
  let client = CompletionClient::new(registry(), transport.clone());

  let mut shown = String::new();
  let outcome = client
    .run_turn(turn(), &Default::default(), |update| match update {
      LiveUpdate::Chunk(StreamChunk::Content { text, .. }) => shown.push_str(&text),
      LiveUpdate::Reset { .. } => shown.clear(),
      LiveUpdate::Chunk(_) => {}
    })
    .await
    .expect("turn starts");

  assert_eq!(shown, "Hi there");
  assert_eq!(transport.request_count(), 2);
  let TurnOutcome::Completed(turn) = outcome else {
    panic!("expected completion");
  };
  assert_eq!(turn.message.content, "Hi there");
  assert_eq!(turn.model, "qwen3");
  assert_eq!(turn.attempts, 2);
}

#[tokio::test]
async fn tool_calls_arrive_on_the_final_message() {
  let call = ToolCall::function("call_7", "recall_memory", r#"{"query":"birthday"}"#);
  let transport = Arc::new(ScriptedTransport::new(vec![vec![
    StreamChunk::ToolCallStart {
      id: "call_7".to_string(),
      name: "recall_memory".to_string(),
    },
    StreamChunk::ToolCallArguments {
      id: "call_7".to_string(),
      fragment: r#"{"query":"birthday"}"#.to_string(),
    },
    StreamChunk::ToolCallEnd { call: call.clone() },
    StreamChunk::Done,
  ]]));
  let client = CompletionClient::new(registry(), transport);

  let outcome = client
    .run_turn(turn(), &Default::default(), |_| {})
    .await
    .expect("turn starts");

  assert_eq!(outcome.status(), MessageStatus::Complete);
  assert_eq!(
    outcome.message().map(|message| message.tool_calls().to_vec()),
    Some(vec![call])
  );
}

#[tokio::test]
async fn cancelling_a_subscription_keeps_partial_output() {
  let transport = Arc::new(ScriptedTransport::open_ended(vec![content(
    "Once upon a time",
    true,
  )]));
  let client = CompletionClient::new(registry(), transport);

  let mut subscription = client.subscribe(turn());
  let first = subscription.updates.recv().await.expect("first update");
  assert_eq!(first, LiveUpdate::Chunk(content("Once upon a time", true)));

  subscription.cancel();
  let outcome = subscription.outcome().await.expect("turn starts");

  assert_eq!(outcome.status(), MessageStatus::Cancelled);
  let TurnOutcome::Cancelled {
    partial: PartialOutput::Partial(message),
  } = outcome
  else {
    panic!("expected partial output");
  };
  assert_eq!(message.content, "Once upon a time");
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_backoff_stops_before_the_retry() {
  let transport = Arc::new(ScriptedTransport::new(vec![vec![
    content("Hi", true),
    StreamChunk::Error(StreamError::transport("connection reset")),
  ]]));
  let client = CompletionClient::new(registry(), transport.clone());

  let cancel = CancellationToken::new();
  let on_reset = cancel.clone();
  let outcome = client
    .run_turn(turn(), &cancel, move |update| {
      if matches!(update, LiveUpdate::Reset { .. }) {
        on_reset.cancel();
      }
    })
    .await
    .expect("turn starts");

  assert_eq!(
    outcome,
    TurnOutcome::Cancelled {
      partial: PartialOutput::None
    }
  );
  assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn unknown_model_fails_before_any_request() {
  let transport = Arc::new(ScriptedTransport::default());
  let client = CompletionClient::new(registry(), transport.clone());

  let result = client
    .run_turn(
      ChatTurn::new(vec![ChatMessage::user("hi")]).with_model("nobody/nothing"),
      &Default::default(),
      |_| {},
    )
    .await;

  assert!(result.is_err());
  assert_eq!(transport.request_count(), 0);
}
