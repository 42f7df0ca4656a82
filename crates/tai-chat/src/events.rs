//! Conversation event types

/// Events produced while a response streams
#[derive(Debug)]
pub enum ConversationEvent {
    /// A non-empty fragment of the assistant reply, in arrival order
    Content(String),
    /// The reply is complete; no `Content` follows
    Finished,
    /// Transport or protocol fault
    Error(tai_ai::Error),
}

impl ConversationEvent {
    /// Get the fragment if this is a content event
    pub fn as_content(&self) -> Option<&str> {
        match self {
            ConversationEvent::Content(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ConversationEvent::Finished)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ConversationEvent::Error(_))
    }
}

/// How a streamed turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The endpoint closed the stream normally
    Completed,
    /// At least one error was reported
    Errored,
    /// The token fired or the caller stopped pulling
    Cancelled,
}
