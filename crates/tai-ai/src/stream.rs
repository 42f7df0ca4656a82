//! Streaming chunk types and utilities

use crate::error::Result;
use crate::types::{FinishReason, Usage};
use std::pin::Pin;
use tokio_stream::Stream;

/// One incremental unit delivered by a streaming completion.
///
/// Only the first choice is carried; the chat client never asks for `n > 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionChunk {
    /// Text delta, possibly empty
    pub content: Option<String>,
    /// Set on the chunk that closes the assistant content
    pub finish_reason: Option<FinishReason>,
    /// Cumulative usage, usually only on the last chunk
    pub usage: Option<Usage>,
}

impl CompletionChunk {
    /// A chunk carrying only a text delta
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content: Some(delta.into()),
            ..Default::default()
        }
    }

    /// A chunk closing the content with the given reason
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }

    /// A usage-only chunk
    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }

    /// The text delta if it is non-empty
    pub fn delta(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.is_empty())
    }
}

/// A stream of completion chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// Folds streamed chunks into the full reply and the latest usage figure
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    content: String,
    usage: Usage,
    finish_reason: Option<FinishReason>,
}

impl ChunkAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk. Returns `true` only for the chunk that first reports a
    /// finish reason, i.e. the moment the content has just finished.
    pub fn add_chunk(&mut self, chunk: &CompletionChunk) -> bool {
        if let Some(delta) = chunk.delta() {
            self.content.push_str(delta);
        }
        if let Some(usage) = chunk.usage {
            self.usage = usage;
        }
        match (&self.finish_reason, &chunk.finish_reason) {
            (None, Some(reason)) => {
                self.finish_reason = Some(reason.clone());
                true
            }
            _ => false,
        }
    }

    /// Text reconstructed so far
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Last usage reported by the endpoint, zero if none yet
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Finish reason, once reported
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    /// Whether the endpoint has closed the content
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }
}
