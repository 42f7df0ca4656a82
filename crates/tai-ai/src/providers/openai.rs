//! OpenAI Chat Completions API, shared by every OpenAI-compatible dialect

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::{
    binding::EndpointBinding,
    error::{Error, Result},
    providers::CompletionSource,
    stream::{ChunkStream, CompletionChunk},
    types::{ChatMessage, Completion, FinishReason, Provider, RequestOptions, Role, Usage},
};

impl EndpointBinding {
    /// Send a non-streaming completion request
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<Completion> {
        let request = self.build_request(messages, options, false);
        let response = self
            .request_builder()
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), extract_error_message(&text)));
        }

        let body: CompletionResponse = response.json().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedResponse("response had no choices".into()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from),
            usage: body.usage.unwrap_or_default(),
        })
    }

    fn request_builder(&self) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url());
        let builder = self
            .client()
            .post(url)
            .header("content-type", "application/json");
        match self.api_key() {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
        stream: bool,
    ) -> OpenAIRequest {
        let provider = self.provider();
        OpenAIRequest {
            model: self.model().to_string(),
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: wire_role(provider, m.role),
                    content: m.content.clone(),
                })
                .collect(),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
            // Not part of Anthropic's compatibility surface
            seed: if provider == Provider::Anthropic {
                None
            } else {
                options.seed
            },
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionSource for EndpointBinding {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        options: &RequestOptions,
    ) -> Result<ChunkStream> {
        let request = self.build_request(&messages, options, true);

        tracing::debug!(
            provider = %self.provider(),
            model = %self.model(),
            messages = messages.len(),
            "Starting streaming completion"
        );

        let event_source = EventSource::new(self.request_builder().json(&request))
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

/// Only the official OpenAI endpoint understands the `developer` role
fn wire_role(provider: Provider, role: Role) -> &'static str {
    match (provider, role) {
        (Provider::OpenAI, Role::Developer) => "developer",
        (_, Role::Developer) => "system",
        (_, role) => role.as_str(),
    }
}

fn create_stream(
    mut event_source: EventSource,
) -> impl futures::Stream<Item = Result<CompletionChunk>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data.trim() == "[DONE]" {
                        break;
                    }
                    match parse_chunk(&msg.data) {
                        Ok(chunk) => yield Ok(chunk),
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let text = response.text().await.unwrap_or_default();
                    yield Err(Error::api(status.as_u16(), extract_error_message(&text)));
                    break;
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    yield Err(Error::Http(e));
                    break;
                }
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }

        // Stop the event source from reconnecting
        event_source.close();
    }
}

/// Decode one SSE data payload into a chunk
pub(crate) fn parse_chunk(data: &str) -> Result<CompletionChunk> {
    let raw: StreamChunk =
        serde_json::from_str(data).map_err(|e| Error::Decode(format!("{}: {}", e, data)))?;

    // Reported mid-stream, after the 200 status was already sent
    if let Some(err) = raw.error {
        return Err(Error::UnexpectedResponse(err.message()));
    }

    let choice = raw.choices.into_iter().next();
    let (content, finish_reason) = match choice {
        Some(choice) => (
            choice.delta.and_then(|d| d.content),
            choice.finish_reason.as_deref().map(FinishReason::from),
        ),
        None => (None, None),
    };

    Ok(CompletionChunk {
        content,
        finish_reason,
        usage: raw.usage,
    })
}

/// Pull a human-readable message out of an error body
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message(),
        Err(_) if body.trim().is_empty() => "empty error response".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

/// OpenAI nests `{message}`, Ollama sends a bare string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiError {
    Detailed { message: String },
    Plain(String),
}

impl ApiError {
    fn message(self) -> String {
        match self {
            ApiError::Detailed { message } | ApiError::Plain(message) => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EndpointConfig, StaticCredentials};

    fn binding(provider: Provider) -> EndpointBinding {
        let creds = StaticCredentials::new().with("KEY", "k");
        let config = EndpointConfig::new(provider, "m").with_credential_source("KEY");
        EndpointBinding::resolve(&config, &creds).unwrap()
    }

    #[test]
    fn test_parse_content_chunk() {
        let chunk = parse_chunk(
            r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant","content":"He"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.delta(), Some("He"));
        assert_eq!(chunk.finish_reason, None);
        assert_eq!(chunk.usage, None);
    }

    #[test]
    fn test_parse_finish_chunk() {
        let chunk =
            parse_chunk(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert_eq!(chunk.delta(), None);
        assert_eq!(chunk.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_parse_usage_only_chunk() {
        let chunk = parse_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":3,"total_tokens":12}}"#,
        )
        .unwrap();
        assert_eq!(chunk.usage.map(|u| u.total_tokens), Some(12));
    }

    #[test]
    fn test_parse_inline_error() {
        let err = parse_chunk(r#"{"error":{"message":"model not loaded"}}"#).unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
        assert!(matches!(err, Error::UnexpectedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        assert!(matches!(parse_chunk("not json"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            "bad key"
        );
        assert_eq!(extract_error_message(r#"{"error":"no such model"}"#), "no such model");
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_error_message(""), "empty error response");
    }

    #[test]
    fn test_developer_role_mapped_per_dialect() {
        assert_eq!(wire_role(Provider::OpenAI, Role::Developer), "developer");
        assert_eq!(wire_role(Provider::Ollama, Role::Developer), "system");
        assert_eq!(wire_role(Provider::Anthropic, Role::User), "user");
    }

    #[test]
    fn test_streaming_request_asks_for_usage() {
        let request = binding(Provider::OpenAI).build_request(
            &[ChatMessage::user("hello")],
            &RequestOptions::default(),
            true,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["seed"], 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_anthropic_request_drops_seed() {
        let request = binding(Provider::Anthropic).build_request(
            &[ChatMessage::developer("be brief")],
            &RequestOptions::default(),
            false,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("seed").is_none());
        assert!(json.get("stream_options").is_none());
        assert_eq!(json["messages"][0]["role"], "system");
    }
}
