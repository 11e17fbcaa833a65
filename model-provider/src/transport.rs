//! Completion transport
//!
//! Opens one attempt against a provider and yields its chunks. Failures
//! after this point are chunks, never `Err`.

use std::future::Future;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use solace_config::{Provider, TransportConfig};
use solace_protocol::{CompletionRequest, ErrorKind, StreamChunk, StreamError};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, ModelError, Result};
use crate::registry::ResolvedModel;
use crate::streaming::{ChunkStream, SseParser, StreamDecoder};
use crate::wire::{self, WireModelList, WireResponse};

/// Something that can run one completion attempt
#[async_trait]
pub trait CompletionTransport: Send + Sync {
  /// Issue `request` against `target`.
  ///
  /// The returned stream is lazy, ends with exactly one `Done` or `Error`
  /// chunk and cannot be restarted.
  fn open(&self, request: CompletionRequest, target: ResolvedModel) -> ChunkStream;

  /// Model ids advertised by the provider's model-list endpoint
  async fn list_models(&self, provider: &Provider) -> Result<Vec<String>>;
}

/// OpenAI-compatible HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: Client,
  settings: TransportConfig,
}

impl HttpTransport {
  pub fn new(settings: TransportConfig) -> Result<Self> {
    let client = Client::builder()
      .connect_timeout(settings.connect_timeout())
      .build()?;
    Ok(Self { client, settings })
  }
}

enum Waited<T> {
  Ready(T),
  Idle,
  Deadline,
}

/// Waits for `future`, giving up after `idle` of silence or at `deadline`.
/// Without `idle` only the deadline applies.
async fn wait_for<F: Future>(
  future: F,
  idle: Option<Duration>,
  deadline: Instant,
) -> Waited<F::Output> {
  let idle_timer = async {
    match idle {
      Some(idle) => sleep(idle).await,
      None => std::future::pending::<()>().await,
    }
  };
  tokio::select! {
    biased;
    _ = sleep_until(deadline) => Waited::Deadline,
    output = future => Waited::Ready(output),
    _ = idle_timer => Waited::Idle,
  }
}

fn endpoint_url(base_url: &str, path: &str) -> Result<Url> {
  let joined = format!(
    "{}/{}",
    base_url.trim_end_matches('/'),
    path.trim_start_matches('/')
  );
  Ok(Url::parse(&joined)?)
}

fn authorize(mut builder: RequestBuilder, provider: &Provider) -> RequestBuilder {
  if let Some(key) = provider.credential() {
    builder = builder.bearer_auth(key);
  }
  for (name, value) in &provider.headers {
    builder = builder.header(name, value);
  }
  builder
}

fn request_failure(err: &reqwest::Error) -> StreamError {
  if err.is_builder() {
    StreamError::new(ErrorKind::Client, err.to_string(), false)
  } else {
    StreamError::transport(err.to_string())
  }
}

fn idle_failure(idle: Duration) -> StreamError {
  StreamError::transport(format!("no data received for {}s", idle.as_secs()))
}

fn deadline_failure(total: Duration) -> StreamError {
  StreamError::timeout(format!("request exceeded {}s", total.as_secs()))
}

async fn error_response(response: Response, idle: Duration, deadline: Instant) -> StreamError {
  let status = response.status().as_u16();
  let headers = response.headers().clone();
  let body = match wait_for(response.text(), Some(idle), deadline).await {
    Waited::Ready(Ok(body)) => body,
    _ => String::new(),
  };
  let error = ApiError::from_response(status, &headers, &body);
  warn!(status, error = %error, "provider returned an error response");
  error.to_stream_error()
}

#[async_trait]
impl CompletionTransport for HttpTransport {
  fn open(&self, request: CompletionRequest, target: ResolvedModel) -> ChunkStream {
    let client = self.client.clone();
    let settings = self.settings;

    Box::pin(stream! {
      let total = settings.request_timeout();
      let idle = settings.idle_timeout();
      let deadline = Instant::now() + total;
      let provider = &target.provider;

      let url = match endpoint_url(&provider.base_url, &provider.api_endpoint) {
        Ok(url) => url,
        Err(err) => {
          yield StreamChunk::Error(StreamError::new(ErrorKind::Client, err.to_string(), false));
          return;
        }
      };

      let body = wire::request_body(&request, provider.include_stream_usage);
      let mut builder = authorize(client.post(url.clone()), provider).json(&body);
      if request.stream {
        builder = builder.header(ACCEPT, "text/event-stream");
      }

      debug!(
        provider = %provider.id,
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        %url,
        "sending completion request"
      );

      // A non-streamed answer arrives in one piece once it is fully generated
      let silence_limit = request.stream.then_some(idle);
      let response = match wait_for(builder.send(), silence_limit, deadline).await {
        Waited::Ready(Ok(response)) => response,
        Waited::Ready(Err(err)) => {
          yield StreamChunk::Error(request_failure(&err));
          return;
        }
        Waited::Idle => {
          yield StreamChunk::Error(idle_failure(idle));
          return;
        }
        Waited::Deadline => {
          yield StreamChunk::Error(deadline_failure(total));
          return;
        }
      };

      if !response.status().is_success() {
        yield StreamChunk::Error(error_response(response, idle, deadline).await);
        return;
      }

      if !request.stream {
        let text = match wait_for(response.text(), None, deadline).await {
          Waited::Ready(Ok(text)) => text,
          Waited::Ready(Err(err)) => {
            yield StreamChunk::Error(request_failure(&err));
            return;
          }
          Waited::Idle => {
            yield StreamChunk::Error(idle_failure(idle));
            return;
          }
          Waited::Deadline => {
            yield StreamChunk::Error(deadline_failure(total));
            return;
          }
        };

        let value = match serde_json::from_str::<serde_json::Value>(&text) {
          Ok(value) => value,
          Err(err) => {
            yield StreamChunk::Error(StreamError::protocol(format!("unreadable response body: {err}")));
            return;
          }
        };
        if let Some(error) = ApiError::from_json(&value) {
          yield StreamChunk::Error(error.to_stream_error());
          return;
        }
        match serde_json::from_value::<WireResponse>(value) {
          Ok(wire) => {
            for chunk in wire.into_response(&target.reasoning_format()).into_chunks() {
              yield chunk;
            }
          }
          Err(err) => {
            yield StreamChunk::Error(StreamError::protocol(format!("unexpected response shape: {err}")));
          }
        }
        return;
      }

      let mut parser = SseParser::new();
      let mut decoder = StreamDecoder::new(target.reasoning_format(), settings.max_malformed_events);
      let mut bytes = response.bytes_stream();

      loop {
        match wait_for(bytes.next(), Some(idle), deadline).await {
          Waited::Ready(Some(Ok(chunk))) => {
            for data in parser.push(&chunk) {
              for decoded in decoder.decode_event(&data) {
                yield decoded;
              }
              if decoder.is_terminated() {
                return;
              }
            }
          }
          Waited::Ready(Some(Err(err))) => {
            yield StreamChunk::Error(request_failure(&err));
            return;
          }
          Waited::Ready(None) => break,
          Waited::Idle => {
            warn!(provider = %target.provider.id, "stream stalled");
            yield StreamChunk::Error(idle_failure(idle));
            return;
          }
          Waited::Deadline => {
            yield StreamChunk::Error(deadline_failure(total));
            return;
          }
        }
      }

      for data in parser.finish() {
        for decoded in decoder.decode_event(&data) {
          yield decoded;
        }
      }
      for decoded in decoder.finish() {
        yield decoded;
      }
    })
  }

  async fn list_models(&self, provider: &Provider) -> Result<Vec<String>> {
    let url = endpoint_url(&provider.base_url, &provider.models_endpoint)?;
    let response = authorize(self.client.get(url), provider)
      .timeout(self.settings.request_timeout())
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let headers = response.headers().clone();
      let body = response.text().await.unwrap_or_default();
      return Err(ModelError::Api(ApiError::from_response(
        status.as_u16(),
        &headers,
        &body,
      )));
    }

    let list: WireModelList = response.json().await?;
    Ok(list.data.into_iter().map(|entry| entry.id).collect())
  }
}
