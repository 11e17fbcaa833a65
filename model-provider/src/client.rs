//! Completion client
//!
//! Ties the registry, request builder, rate limiter, transport, retry
//! policy and aggregator into one call per chat turn.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use solace_config::AiConfig;
use solace_protocol::{ChatMessage, CompletionRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregator::{LiveUpdate, ResponseAggregator, TurnOutcome};
use crate::builder::{self, RequestOptions};
use crate::error::{ModelError, Result};
use crate::rate_limit::RateLimiter;
use crate::registry::{ProviderRegistry, ResolvedModel};
use crate::retry::{self, RetryPolicy};
use crate::streaming::ChunkStream;
use crate::transport::{CompletionTransport, HttpTransport};

/// One chat turn to run
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
  /// Bare or provider-qualified model id; the registry default when unset
  pub model: Option<String>,
  /// Conversation so far, oldest first
  pub history: Vec<ChatMessage>,
  pub options: RequestOptions,
}

impl ChatTurn {
  pub fn new(history: Vec<ChatMessage>) -> Self {
    Self {
      history,
      ..Self::default()
    }
  }

  pub fn with_model(mut self, model: impl Into<String>) -> Self {
    self.model = Some(model.into());
    self
  }

  pub fn with_options(mut self, options: RequestOptions) -> Self {
    self.options = options;
    self
  }
}

/// Entry point for running completions
#[derive(Clone)]
pub struct CompletionClient {
  registry: Arc<ProviderRegistry>,
  transport: Arc<dyn CompletionTransport>,
  limiter: RateLimiter,
}

impl CompletionClient {
  pub fn new(registry: Arc<ProviderRegistry>, transport: Arc<dyn CompletionTransport>) -> Self {
    Self {
      registry,
      transport,
      limiter: RateLimiter::new(),
    }
  }

  /// Client backed by the HTTP transport and the catalog in `config`
  pub fn from_config(config: &AiConfig) -> Result<Self> {
    let registry = ProviderRegistry::from_config(config)?;
    let transport = HttpTransport::new(config.transport)?;
    Ok(Self::new(Arc::new(registry), Arc::new(transport)))
  }

  pub fn registry(&self) -> &Arc<ProviderRegistry> {
    &self.registry
  }

  /// Resolve the target and build the request without sending it
  pub async fn prepare(&self, turn: &ChatTurn) -> Result<(ResolvedModel, CompletionRequest)> {
    let target = match &turn.model {
      Some(model_id) => self.registry.resolve_model(model_id).await?,
      None => self.registry.default_model().await?,
    };
    if !target.provider.has_required_credential() {
      return Err(ModelError::MissingCredential(target.provider.id.clone()));
    }
    let request = builder::build(&target, &turn.history, &turn.options)?;
    Ok((target, request))
  }

  /// Run a turn to completion, reporting every chunk through `on_update`.
  ///
  /// Setup problems (unknown model, missing credential, context overflow)
  /// are `Err`; everything that happens once the request is in flight ends
  /// up in the returned `TurnOutcome`.
  pub async fn run_turn<F>(
    &self,
    turn: ChatTurn,
    cancel: &CancellationToken,
    on_update: F,
  ) -> Result<TurnOutcome>
  where
    F: FnMut(LiveUpdate),
  {
    let (target, request) = self.prepare(&turn).await?;
    let qualified = target.qualified_id();
    let model_id = target.model.id.clone();
    info!(
      model = %qualified,
      stream = request.stream,
      messages = request.messages.len(),
      "starting completion turn"
    );

    let policy = RetryPolicy::from_config(&target.provider.rate_limit);
    let estimated_tokens = builder::estimate_request_tokens(&request);
    let transport = Arc::clone(&self.transport);
    let limiter = self.limiter.clone();

    let events = retry::execute(policy, move |attempt| -> ChunkStream {
      let transport = Arc::clone(&transport);
      let limiter = limiter.clone();
      let request = request.clone();
      let target = target.clone();
      Box::pin(stream! {
        let waited = limiter
          .admit(&target.provider.id, &target.provider.rate_limit, estimated_tokens)
          .await;
        debug!(attempt, waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX), "attempt admitted");
        let mut chunks = transport.open(request, target);
        while let Some(chunk) = chunks.next().await {
          yield chunk;
        }
      })
    });

    let outcome = ResponseAggregator::new(model_id, on_update)
      .run(events, cancel)
      .await;
    info!(model = %qualified, status = ?outcome.status(), "completion turn finished");
    Ok(outcome)
  }

  /// Run a turn on a background task, exposing updates as a channel
  pub fn subscribe(&self, turn: ChatTurn) -> TurnSubscription {
    let (tx, updates) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = self.clone();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
      client
        .run_turn(turn, &token, move |update| {
          // The receiver may be gone; the outcome is still reported
          let _ = tx.send(update);
        })
        .await
    });
    TurnSubscription {
      updates,
      cancel,
      task,
    }
  }

  /// Ask a provider for its models and add unknown ones to the catalog.
  /// Returns how many were added.
  pub async fn discover_models(&self, provider_id: &str) -> Result<usize> {
    let provider = self
      .registry
      .provider(provider_id)
      .await
      .ok_or_else(|| ModelError::ProviderNotFound(provider_id.to_string()))?;
    let model_ids = self.transport.list_models(&provider).await?;
    let added = self
      .registry
      .merge_discovered_models(provider_id, model_ids)
      .await?;
    info!(provider = provider_id, added, "model discovery finished");
    Ok(added)
  }
}

/// Handle on a turn running in the background
pub struct TurnSubscription {
  pub updates: mpsc::UnboundedReceiver<LiveUpdate>,
  cancel: CancellationToken,
  task: JoinHandle<Result<TurnOutcome>>,
}

impl TurnSubscription {
  /// Stop the turn; `outcome` then resolves to `Cancelled`
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub async fn outcome(self) -> Result<TurnOutcome> {
    self
      .task
      .await
      .map_err(|err| ModelError::Task(err.to_string()))?
  }
}
