//! Conversation state: message history, usage ledger and response streaming.

use std::{pin::Pin, sync::Arc};

use async_stream::stream;
use futures::StreamExt;
use tai_ai::{ChatMessage, ChunkAccumulator, CompletionSource, RequestOptions, Usage};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    events::{ConversationEvent, TurnOutcome},
};

/// A stream of conversation events.
///
/// Holds the conversation mutably borrowed, so no other turn can start
/// until it is dropped.
pub type ResponseStream<'a> = Pin<Box<dyn Stream<Item = ConversationEvent> + Send + 'a>>;

/// Developer and system prompts inserted before the first user turn
#[derive(Debug, Clone, Default)]
pub struct Preamble {
    pub developer: Option<String>,
    pub system: Option<String>,
}

impl Preamble {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_developer(mut self, prompt: impl Into<String>) -> Self {
        self.developer = Some(prompt.into());
        self
    }

    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system = Some(prompt.into());
        self
    }

    fn into_messages(self) -> Vec<ChatMessage> {
        let developer = self.developer.filter(|p| !p.trim().is_empty());
        let system = self.system.filter(|p| !p.trim().is_empty());
        developer
            .map(ChatMessage::developer)
            .into_iter()
            .chain(system.map(ChatMessage::system))
            .collect()
    }
}

#[derive(Debug, Default)]
struct UsageLedger {
    tokens_used: u64,
    last_outcome: Option<TurnOutcome>,
}

/// One logical conversation bound to a completion source
pub struct Conversation {
    id: Uuid,
    source: Arc<dyn CompletionSource>,
    options: RequestOptions,
    messages: Vec<ChatMessage>,
    ledger: UsageLedger,
}

impl Conversation {
    /// Create a conversation, inserting the preamble once
    pub fn new(source: Arc<dyn CompletionSource>, preamble: Preamble) -> Self {
        let id = Uuid::new_v4();
        let messages = preamble.into_messages();
        tracing::debug!(conversation = %id, preamble = messages.len(), "Conversation created");
        Self {
            id,
            source,
            options: RequestOptions::default(),
            messages,
            ledger: UsageLedger::default(),
        }
    }

    /// Replace the sampling options sent with every request
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Messages in prompt order
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Tokens reported across every streamed turn so far
    pub fn tokens_used(&self) -> u64 {
        self.ledger.tokens_used
    }

    /// How the most recent stream ended, if any has ended
    pub fn last_outcome(&self) -> Option<TurnOutcome> {
        self.ledger.last_outcome
    }

    /// Append a user turn
    pub fn add_message(&mut self, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::InvalidUsage("user message is empty".into()));
        }
        self.messages.push(ChatMessage::user(content));
        Ok(())
    }

    /// Append the reconstructed assistant reply so it becomes context for the
    /// next turn. Not done automatically by [`stream_response`](Self::stream_response).
    pub fn add_system_response(&mut self, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        if content.is_empty() {
            return Err(Error::InvalidUsage("assistant response is empty".into()));
        }
        self.messages.push(ChatMessage::assistant(content));
        Ok(())
    }

    /// Stream the assistant reply to the current history.
    ///
    /// Nothing is sent until the stream is first polled. Usage is committed
    /// exactly once, when the stream is dropped or runs out, whichever way it
    /// ends. `Finished` is held back until the endpoint closes the stream so
    /// that a caller who stops at `Finished` has already seen the usage report.
    pub fn stream_response(&mut self, cancel: CancellationToken) -> ResponseStream<'_> {
        let messages = self.messages.clone();
        let source = Arc::clone(&self.source);
        let options = self.options.clone();
        let mut commit = UsageCommit::new(self.id, &mut self.ledger);

        Box::pin(stream! {
            tracing::debug!(
                conversation = %commit.conversation,
                messages = messages.len(),
                "Requesting completion"
            );

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = source.stream_chat(messages, &options) => Some(result),
            };

            let mut chunks = match opened {
                Some(Ok(chunks)) => chunks,
                Some(Err(e)) => {
                    tracing::warn!(conversation = %commit.conversation, "Completion request failed: {}", e);
                    commit.errored();
                    yield ConversationEvent::Error(e);
                    return;
                }
                None => return,
            };

            let mut acc = ChunkAccumulator::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = chunks.next() => Some(next),
                };

                match next {
                    // Cancelled: the transport is released when `chunks` drops
                    None => return,
                    Some(Some(Ok(chunk))) => {
                        let just_finished = acc.add_chunk(&chunk);
                        commit.observe(acc.usage());
                        if just_finished {
                            tracing::debug!(
                                conversation = %commit.conversation,
                                reason = ?acc.finish_reason(),
                                "Content finished"
                            );
                        }

                        if let Some(delta) = chunk.delta() {
                            // The finishing chunk may itself carry the last fragment
                            if acc.is_finished() && !just_finished {
                                tracing::warn!(
                                    conversation = %commit.conversation,
                                    "Dropping content received after finish"
                                );
                            } else {
                                yield ConversationEvent::Content(delta.to_string());
                            }
                        }
                    }
                    Some(Some(Err(e))) => {
                        tracing::warn!(conversation = %commit.conversation, "Stream error: {}", e);
                        commit.errored();
                        yield ConversationEvent::Error(e);
                    }
                    Some(None) => break,
                }
            }

            tracing::debug!(
                conversation = %commit.conversation,
                chars = acc.content().len(),
                "Stream closed"
            );
            commit.completed();
            if acc.is_finished() || !commit.has_errored() {
                yield ConversationEvent::Finished;
            }
        })
    }
}

/// Adds a stream's usage to the ledger when dropped.
///
/// Lives inside the response stream, so it runs on every exit path: natural
/// end, error, cancellation, early drop, or never being polled at all.
struct UsageCommit<'a> {
    conversation: Uuid,
    ledger: &'a mut UsageLedger,
    usage: Usage,
    outcome: TurnOutcome,
}

impl<'a> UsageCommit<'a> {
    fn new(conversation: Uuid, ledger: &'a mut UsageLedger) -> Self {
        Self {
            conversation,
            ledger,
            usage: Usage::default(),
            outcome: TurnOutcome::Cancelled,
        }
    }

    fn observe(&mut self, usage: Usage) {
        self.usage = usage;
    }

    fn errored(&mut self) {
        self.outcome = TurnOutcome::Errored;
    }

    fn has_errored(&self) -> bool {
        self.outcome == TurnOutcome::Errored
    }

    fn completed(&mut self) {
        if !self.has_errored() {
            self.outcome = TurnOutcome::Completed;
        }
    }
}

impl Drop for UsageCommit<'_> {
    fn drop(&mut self) {
        self.ledger.tokens_used += self.usage.total_tokens;
        self.ledger.last_outcome = Some(self.outcome);
        tracing::debug!(
            conversation = %self.conversation,
            outcome = ?self.outcome,
            tokens = self.usage.total_tokens,
            total = self.ledger.tokens_used,
            "Committed turn usage"
        );
    }
}
