//! Error types for tai-chat

use thiserror::Error;

/// Result type alias using tai-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during conversation operations
#[derive(Error, Debug)]
pub enum Error {
    /// The call was not valid for the conversation's current state
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

impl Error {
    /// Check if this error came from calling out of turn
    pub fn is_invalid_usage(&self) -> bool {
        matches!(self, Error::InvalidUsage(_))
    }
}
