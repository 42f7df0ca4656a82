//! Completion stream sources

pub mod openai;

use crate::{ChatMessage, ChunkStream, RequestOptions, Result};
use async_trait::async_trait;

/// Anything that can turn a chat history into a stream of completion chunks.
///
/// Chunks must arrive in order; the last usage report seen is treated as the
/// total for the exchange.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Start a streaming completion over the full message history
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &RequestOptions,
    ) -> Result<ChunkStream>;
}
