//! Retry policy
//!
//! Re-issues a whole request after a retryable `Error` chunk. Streams have
//! no resume point, so every retry starts from scratch and consumers are
//! told to discard what the failed attempt produced.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use solace_config::RateLimitConfig;
use solace_protocol::{StreamChunk, StreamError};
use tracing::warn;

use crate::streaming::ChunkStream;

/// Upper bound on any single backoff, server hints included
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
  /// Retries after the first attempt, so at most `max_retries + 1` calls
  pub max_retries: u32,
  /// Delay before the first retry when the server gives no hint
  pub base_delay: Duration,
  pub backoff_multiplier: f64,
}

impl RetryPolicy {
  pub fn from_config(config: &RateLimitConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      base_delay: Duration::from_millis(config.retry_after_ms),
      backoff_multiplier: config.backoff_multiplier,
    }
  }

  /// Never retry
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      base_delay: Duration::ZERO,
      backoff_multiplier: 1.0,
    }
  }

  /// Delay before retry number `retry` (1-based); a server hint wins
  pub fn delay_for(&self, retry: u32, hint_ms: Option<u64>) -> Duration {
    if let Some(ms) = hint_ms {
      return Duration::from_millis(ms).min(MAX_DELAY);
    }
    let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
    let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
    Duration::try_from_secs_f64(secs)
      .unwrap_or(MAX_DELAY)
      .min(MAX_DELAY)
  }

  pub fn should_retry(&self, error: &StreamError, retries_done: u32) -> bool {
    error.retryable && retries_done < self.max_retries
  }
}

/// What the retry executor yields
#[derive(Debug, Clone, PartialEq)]
pub enum RetryEvent {
  /// Chunk of the current attempt
  Chunk(StreamChunk),
  /// Attempt `attempt` failed with `error`; the next one starts after `delay`
  Retrying {
    attempt: u32,
    delay: Duration,
    error: StreamError,
  },
}

pub type RetryStream = Pin<Box<dyn Stream<Item = RetryEvent> + Send>>;

/// Runs `request_fn(attempt)` until an attempt ends in `Done`, a fatal
/// `Error`, or an `Error` once retries are exhausted.
///
/// `attempt` starts at 1. A stream that ends without a terminal chunk
/// counts as a dropped connection.
pub fn execute<F>(policy: RetryPolicy, mut request_fn: F) -> RetryStream
where
  F: FnMut(u32) -> ChunkStream + Send + 'static,
{
  Box::pin(stream! {
    let mut attempt = 1;
    loop {
      let mut chunks = request_fn(attempt);
      let mut failure = StreamError::transport("stream closed before the response completed");
      let mut completed = false;

      while let Some(chunk) = chunks.next().await {
        if let StreamChunk::Error(error) = chunk {
          failure = error;
          break;
        }
        let done = chunk.is_done();
        yield RetryEvent::Chunk(chunk);
        if done {
          completed = true;
          break;
        }
      }
      drop(chunks);

      if completed {
        return;
      }
      if !policy.should_retry(&failure, attempt - 1) {
        yield RetryEvent::Chunk(StreamChunk::Error(failure));
        return;
      }

      let delay = policy.delay_for(attempt, failure.retry_after_ms);
      warn!(
        attempt,
        max_retries = policy.max_retries,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        error = %failure,
        "completion attempt failed, retrying"
      );
      yield RetryEvent::Retrying {
        attempt,
        delay,
        error: failure,
      };
      tokio::time::sleep(delay).await;
      attempt += 1;
    }
  })
}
