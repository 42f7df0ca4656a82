//! tai-ai: OpenAI-compatible chat completion endpoints
//!
//! Resolves provider connection parameters into an [`EndpointBinding`] and
//! streams chat completions from it.

pub mod binding;
pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use binding::{CredentialSource, EndpointBinding, EndpointConfig, EnvCredentials, StaticCredentials};
pub use error::{Error, Result};
pub use providers::CompletionSource;
pub use stream::{ChunkAccumulator, ChunkStream, CompletionChunk};
pub use types::*;
