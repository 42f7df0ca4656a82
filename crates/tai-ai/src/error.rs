//! Error types for tai-ai

use thiserror::Error;

/// Result type alias using tai-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when binding to or talking with a chat endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// The named credential source was empty or unset
    #[error("API key not found for provider {provider} (source: {source_name})")]
    Credential {
        provider: String,
        source_name: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// A stream chunk could not be decoded
    #[error("Failed to decode chunk: {0}")]
    Decode(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying by the caller.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Sse(_) => true,
            Error::Api { status, message } => {
                let msg = message.to_lowercase();
                *status == 429
                    || *status >= 500
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
            }
            _ => false,
        }
    }

    /// Check if this error came from missing credentials
    pub fn is_credential(&self) -> bool {
        matches!(self, Error::Credential { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_transport_variants() {
        assert!(Error::Sse("connection reset".into()).is_retryable());
        assert!(Error::api(429, "slow down").is_retryable());
        assert!(Error::api(503, "unavailable").is_retryable());
    }

    #[test]
    fn test_retryable_api_overloaded_message() {
        assert!(Error::api(400, "The server is overloaded").is_retryable());
    }

    #[test]
    fn test_not_retryable_client_errors() {
        assert!(!Error::api(401, "Invalid API key").is_retryable());
        assert!(!Error::Decode("bad json".into()).is_retryable());
        assert!(
            !Error::Credential {
                provider: "OpenAI".into(),
                source_name: "OPENAI_API_KEY".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_credential_message_names_source_not_secret() {
        let e = Error::Credential {
            provider: "Ollama".into(),
            source_name: "OLLAMA_KEY".into(),
        };
        assert!(e.is_credential());
        assert_eq!(
            e.to_string(),
            "API key not found for provider Ollama (source: OLLAMA_KEY)"
        );
    }
}
