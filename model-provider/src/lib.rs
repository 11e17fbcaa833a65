// Solace Model Provider
// Completion client for OpenAI-compatible chat endpoints

pub mod aggregator;
pub mod builder;
pub mod client;
pub mod error;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod streaming;
pub mod transport;
pub mod wire;

pub use aggregator::{
  CompletedTurn, FailedTurn, LiveUpdate, PartialOutput, ResponseAggregator, TurnOutcome,
};
pub use builder::{RequestOptions, build, estimate_request_tokens, estimate_tokens};
pub use client::{ChatTurn, CompletionClient, TurnSubscription};
pub use error::{ApiError, Capability, ModelError, Result};
pub use rate_limit::RateLimiter;
pub use registry::{ProviderRegistry, ResolvedModel};
pub use retry::{RetryEvent, RetryPolicy, RetryStream};
pub use streaming::{ChunkStream, StreamDecoder};
pub use transport::{CompletionTransport, HttpTransport};
