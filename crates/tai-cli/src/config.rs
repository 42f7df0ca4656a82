//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tai_ai::{EndpointConfig, Provider, RequestOptions};
use tai_chat::Preamble;

/// Provider used when neither flags nor the config file pick one
pub const DEFAULT_PROVIDER: &str = "ollama";
/// Model used when neither flags nor the config file pick one
pub const DEFAULT_MODEL: &str = "gemma3:1b";
/// Credential variable used with the default provider
pub const DEFAULT_API_KEY_ENV: &str = "OLLAMA_KEY";

/// Configuration for tai
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider dialect (openai, ollama, anthropic)
    pub provider: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Base URL override
    pub base_url: Option<String>,
    /// Developer prompt inserted before the first turn
    pub developer_prompt: Option<String>,
    /// System prompt inserted before the first turn
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens per reply
    pub max_tokens: Option<u32>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tai")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TAI_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from `path`, or the default location. A missing file is
    /// not an error; an unreadable one is logged and ignored.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let default_config = Config {
            provider: Some(DEFAULT_PROVIDER.to_string()),
            model: Some(DEFAULT_MODEL.to_string()),
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_string()),
            ..Default::default()
        };
        let content = toml::to_string_pretty(&default_config).map_err(std::io::Error::other)?;
        fs::write(&path, content)?;
        Ok(path)
    }
}

/// Values given on the command line; each overrides the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub developer_prompt: Option<String>,
    pub system_prompt: Option<String>,
}

/// Everything needed to start a conversation
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: EndpointConfig,
    pub preamble: Preamble,
    pub options: RequestOptions,
}

impl Settings {
    /// Merge flags over the config file over built-in defaults
    pub fn resolve(overrides: Overrides, config: Config) -> tai_ai::Result<Self> {
        let provider: Provider = overrides
            .provider
            .or(config.provider)
            .as_deref()
            .unwrap_or(DEFAULT_PROVIDER)
            .parse()?;

        let model = overrides
            .model
            .or(config.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        // The default key variable only makes sense for the default provider
        let api_key_env = overrides.api_key_env.or(config.api_key_env).or_else(|| {
            (provider == Provider::Ollama).then(|| DEFAULT_API_KEY_ENV.to_string())
        });

        let mut endpoint = EndpointConfig::new(provider, model);
        endpoint.credential_source = api_key_env;
        endpoint.base_url = overrides.base_url.or(config.base_url);

        let preamble = Preamble {
            developer: overrides.developer_prompt.or(config.developer_prompt),
            system: overrides.system_prompt.or(config.system_prompt),
        };

        let options = RequestOptions {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Default::default()
        };

        Ok(Self {
            endpoint,
            preamble,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_local_ollama() {
        let settings = Settings::resolve(Overrides::default(), Config::default()).unwrap();
        assert_eq!(settings.endpoint.provider, Provider::Ollama);
        assert_eq!(settings.endpoint.model, DEFAULT_MODEL);
        assert_eq!(
            settings.endpoint.credential_source.as_deref(),
            Some(DEFAULT_API_KEY_ENV)
        );
        assert_eq!(settings.endpoint.base_url, None);
        assert_eq!(settings.options.seed, Some(1));
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config::parse(
            r#"
provider = "openai"
model = "gpt-4o"
api_key_env = "MY_OPENAI_KEY"
system_prompt = "from file"
temperature = 0.2
"#,
        )
        .unwrap();
        let overrides = Overrides {
            model: Some("gpt-4o-mini".into()),
            system_prompt: Some("from flag".into()),
            ..Default::default()
        };

        let settings = Settings::resolve(overrides, config).unwrap();
        assert_eq!(settings.endpoint.provider, Provider::OpenAI);
        assert_eq!(settings.endpoint.model, "gpt-4o-mini");
        assert_eq!(
            settings.endpoint.credential_source.as_deref(),
            Some("MY_OPENAI_KEY")
        );
        assert_eq!(settings.preamble.system.as_deref(), Some("from flag"));
        assert_eq!(settings.options.temperature, Some(0.2));
    }

    #[test]
    fn test_non_default_provider_uses_its_own_key_variable() {
        let overrides = Overrides {
            provider: Some("anthropic".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(overrides, Config::default()).unwrap();
        assert_eq!(settings.endpoint.credential_source, None);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let overrides = Overrides {
            provider: Some("gemini".into()),
            ..Default::default()
        };
        assert!(Settings::resolve(overrides, Config::default()).is_err());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/tai/config.toml")));
        assert!(config.provider.is_none());
    }
}
