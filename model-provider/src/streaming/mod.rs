//! Streaming support
//!
//! SSE framing, delta decoding and reasoning routing for chat completion
//! streams.

use std::pin::Pin;

use futures::Stream;
use solace_protocol::StreamChunk;

pub mod decoder;
pub mod reasoning;
pub mod sse;

pub use decoder::StreamDecoder;
pub use reasoning::{Segment, ThinkTagSplitter};
pub use sse::SseParser;

/// Lazy chunk sequence of one attempt; ends after `Done` or `Error`
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;
