//! tai-chat: Streaming conversation engine
//!
//! This crate keeps the message history for one conversation, streams each
//! assistant reply as a sequence of events and accounts for the tokens used.

pub mod conversation;
pub mod error;
pub mod events;

pub use conversation::{Conversation, Preamble, ResponseStream};
pub use error::{Error, Result};
pub use events::{ConversationEvent, TurnOutcome};
pub use tokio_util::sync::CancellationToken;
