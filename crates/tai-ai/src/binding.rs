//! Endpoint binding: resolves provider, model, credential and base URL into
//! an immutable handle that can issue chat completion requests.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    error::{Error, Result},
    types::Provider,
};

/// Where secrets come from.
///
/// Injected into [`EndpointBinding::resolve`] so the binding never reads the
/// process environment on its own.
pub trait CredentialSource: Send + Sync {
    /// Look up a credential by name
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads credentials from environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// In-memory credentials, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named credential
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn lookup(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Connection parameters for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Wire dialect and defaults
    pub provider: Provider,
    /// Model identifier sent with every request
    pub model: String,
    /// Name of the credential (e.g. an environment variable), never the secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_source: Option<String>,
    /// Endpoint root; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl EndpointConfig {
    /// Create a config using provider defaults
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            credential_source: None,
            base_url: None,
        }
    }

    /// Name the credential to look up
    pub fn with_credential_source(mut self, name: impl Into<String>) -> Self {
        self.credential_source = Some(name.into());
        self
    }

    /// Override the base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Immutable, cheaply cloneable handle to a chat completion endpoint
#[derive(Clone)]
pub struct EndpointBinding {
    inner: Arc<BindingInner>,
}

struct BindingInner {
    provider: Provider,
    model: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl EndpointBinding {
    /// Resolve a config into a binding.
    ///
    /// The credential is looked up exactly once. A named source that is empty
    /// or unset fails with [`Error::Credential`]; with no source named, the
    /// provider's default variable is tried and only providers that allow
    /// anonymous access may go without one. No network traffic happens here.
    pub fn resolve(config: &EndpointConfig, credentials: &dyn CredentialSource) -> Result<Self> {
        Self::resolve_with_client(config, credentials, reqwest::Client::new())
    }

    /// Same as [`resolve`](Self::resolve) with a caller-provided HTTP client
    pub fn resolve_with_client(
        config: &EndpointConfig,
        credentials: &dyn CredentialSource,
        client: reqwest::Client,
    ) -> Result<Self> {
        let provider = config.provider;
        if config.model.trim().is_empty() {
            return Err(Error::InvalidConfig("model identifier is empty".into()));
        }

        let (source_name, explicit) = match config.credential_source.as_deref() {
            Some(name) if !name.trim().is_empty() => (name, true),
            _ => (provider.api_key_env_var(), false),
        };

        let api_key = credentials
            .lookup(source_name)
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() && (explicit || !provider.allows_anonymous()) {
            tracing::warn!(
                "api key not found for provider: {} and model: {}",
                provider,
                config.model
            );
            return Err(Error::Credential {
                provider: provider.name().to_string(),
                source_name: source_name.to_string(),
            });
        }

        let base_url = config
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(provider.default_base_url())
            .trim_end_matches('/')
            .to_string();

        tracing::debug!(
            provider = %provider,
            model = %config.model,
            base_url = %base_url,
            anonymous = api_key.is_none(),
            "Resolved endpoint binding"
        );

        Ok(Self {
            inner: Arc::new(BindingInner {
                provider,
                model: config.model.clone(),
                base_url,
                api_key,
                client,
            }),
        })
    }

    pub fn provider(&self) -> Provider {
        self.inner.provider
    }

    pub fn model(&self) -> &str {
        &self.inner.model
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Whether requests carry a credential
    pub fn has_credential(&self) -> bool {
        self.inner.api_key.is_some()
    }

    pub(crate) fn api_key(&self) -> Option<&str> {
        self.inner.api_key.as_deref()
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }
}

impl fmt::Debug for EndpointBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointBinding")
            .field("provider", &self.inner.provider)
            .field("model", &self.inner.model)
            .field("base_url", &self.inner.base_url)
            .field("api_key", &self.inner.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
