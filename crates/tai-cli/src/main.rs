//! tai - chat with an OpenAI-compatible model from the terminal

mod config;

use clap::Parser;
use futures::StreamExt;
use std::{io::Write, path::PathBuf, sync::Arc};
use tai_ai::{EndpointBinding, EnvCredentials};
use tai_chat::{Conversation, ConversationEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Overrides, Settings};

/// tai - terminal chat client
#[derive(Parser, Debug)]
#[command(name = "tai")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider (openai, ollama, anthropic)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use (default: gemma3:1b)
    #[arg(short, long)]
    model: Option<String>,

    /// Environment variable holding the API key
    #[arg(long)]
    api_key_env: Option<String>,

    /// Base URL of the endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// System prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Developer prompt
    #[arg(short, long)]
    developer: Option<String>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            api_key_env: self.api_key_env.clone(),
            base_url: self.base_url.clone(),
            developer_prompt: self.developer.clone(),
            system_prompt: self.system.clone(),
        }
    }
}

/// What the user typed at the prompt
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Exit,
    Empty,
    Message(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "exit" | "quit" => Input::Exit,
        _ => Input::Message(line.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("tai=debug,tai_ai=debug,tai_chat=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    if args.init_config {
        let path = Config::init()?;
        println!("Config file: {}", path.display());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref());
    let settings = Settings::resolve(args.overrides(), config)?;
    let binding = EndpointBinding::resolve(&settings.endpoint, &EnvCredentials)?;
    tracing::info!(
        provider = %binding.provider(),
        model = %binding.model(),
        "Starting conversation"
    );

    let mut conversation =
        Conversation::new(Arc::new(binding), settings.preamble).with_options(settings.options);

    run_loop(&mut conversation).await
}

async fn run_loop(conversation: &mut Conversation) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("[user] >> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let input = match line {
            Some(line) => parse_input(&line),
            None => Input::Exit,
        };

        match input {
            Input::Exit => {
                println!();
                println!("Used tokens: {}", conversation.tokens_used());
                println!("Exiting conversation.");
                return Ok(());
            }
            Input::Empty => continue,
            Input::Message(text) => {
                if let Err(e) = respond(conversation, text).await {
                    tracing::error!("Error adding message: {}", e);
                }
                println!();
            }
        }
    }
}

/// Run one turn: send the message, print fragments as they arrive and keep
/// the reply as context for the next turn.
async fn respond(conversation: &mut Conversation, text: String) -> anyhow::Result<()> {
    conversation.add_message(text)?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut reply = String::new();
    {
        let mut stream = conversation.stream_response(cancel);
        while let Some(event) = stream.next().await {
            match event {
                ConversationEvent::Content(fragment) => {
                    if reply.is_empty() {
                        print!("[ai] >> ");
                    }
                    reply.push_str(&fragment);
                    print!("{}", fragment);
                    std::io::stdout().flush()?;
                }
                ConversationEvent::Finished => {}
                ConversationEvent::Error(e) => {
                    tracing::error!(retryable = e.is_retryable(), "Error getting response: {}", e);
                }
            }
        }
    }
    interrupt.abort();

    if !reply.is_empty() {
        conversation.add_system_response(reply)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tai_ai::{
        ChatMessage, ChunkStream, CompletionChunk, CompletionSource, FinishReason, RequestOptions,
        Role, Usage,
    };
    use tai_chat::Preamble;

    /// Replays one fixed reply per request
    struct ReplaySource {
        replies: Mutex<Vec<Vec<tai_ai::Result<CompletionChunk>>>>,
    }

    impl ReplaySource {
        fn new(replies: Vec<Vec<tai_ai::Result<CompletionChunk>>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl CompletionSource for ReplaySource {
        async fn stream_chat(
            &self,
            _messages: Vec<ChatMessage>,
            _options: &RequestOptions,
        ) -> tai_ai::Result<ChunkStream> {
            let chunks = self.replies.lock().unwrap().remove(0);
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn usage(total: u64) -> Usage {
        Usage {
            total_tokens: total,
            ..Usage::default()
        }
    }

    #[tokio::test]
    async fn test_respond_keeps_streamed_reply_as_context() {
        let source = ReplaySource::new(vec![vec![
            Ok(CompletionChunk::text("He")),
            Ok(CompletionChunk::text("llo!")),
            Ok(CompletionChunk::finish(FinishReason::Stop)),
            Ok(CompletionChunk::usage(usage(7))),
        ]]);
        let mut conversation = Conversation::new(source, Preamble::new());

        respond(&mut conversation, "hi".to_string()).await.unwrap();

        let history = conversation.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello!");
        assert_eq!(conversation.tokens_used(), 7);
    }

    #[tokio::test]
    async fn test_respond_skips_empty_reply() {
        let source = ReplaySource::new(vec![
            vec![Err(tai_ai::Error::Sse("connection reset".into()))],
            vec![
                Ok(CompletionChunk::text("")),
                Ok(CompletionChunk::finish(FinishReason::Stop)),
            ],
        ]);
        let mut conversation = Conversation::new(source, Preamble::new());

        respond(&mut conversation, "hi".to_string()).await.unwrap();
        assert_eq!(conversation.history().len(), 1);

        // Nothing to keep from a turn that streamed no text either
        respond(&mut conversation, "again".to_string()).await.unwrap();
        let history = conversation.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.role == Role::User));
    }

    #[tokio::test]
    async fn test_respond_rejects_blank_message() {
        let source = ReplaySource::new(vec![]);
        let mut conversation = Conversation::new(source, Preamble::new());

        assert!(respond(&mut conversation, "   ".to_string()).await.is_err());
        assert!(conversation.history().is_empty());
    }

    #[test]
    fn test_parse_input_sentinels() {
        assert_eq!(parse_input("exit\n"), Input::Exit);
        assert_eq!(parse_input("  quit "), Input::Exit);
        assert_eq!(parse_input("\n"), Input::Empty);
        assert_eq!(
            parse_input("what is a pointer?\n"),
            Input::Message("what is a pointer?".to_string())
        );
    }

    #[test]
    fn test_args_map_to_overrides() {
        let args = Args::parse_from([
            "tai",
            "--provider",
            "openai",
            "--model",
            "gpt-4o",
            "--api-key-env",
            "KEY",
            "-s",
            "be brief",
        ]);
        let overrides = args.overrides();
        assert_eq!(overrides.provider.as_deref(), Some("openai"));
        assert_eq!(overrides.model.as_deref(), Some("gpt-4o"));
        assert_eq!(overrides.api_key_env.as_deref(), Some("KEY"));
        assert_eq!(overrides.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(overrides.developer_prompt, None);
    }
}
