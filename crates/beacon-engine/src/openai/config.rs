//! Assistants API client configuration.

use std::fmt;
use std::time::Duration;

use beacon_config::schema::{RemoteAuth, RemoteConfig};

use crate::EngineError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// How the client authenticates with the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Authorization: Bearer <key>` (api.openai.com).
    Bearer,
    /// `api-key: <key>` (Azure OpenAI).
    AzureApiKey,
}

impl From<RemoteAuth> for AuthMethod {
    fn from(auth: RemoteAuth) -> Self {
        match auth {
            RemoteAuth::Bearer => AuthMethod::Bearer,
            RemoteAuth::AzureApiKey => AuthMethod::AzureApiKey,
        }
    }
}

/// Assistants API client configuration.
#[derive(Clone)]
pub struct AssistantsConfig {
    pub api_key: String,
    pub auth_method: AuthMethod,
    pub base_url: String,
    pub api_version: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_read_retries: u32,
}

impl fmt::Debug for AssistantsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantsConfig")
            .field("auth_method", &self.auth_method)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_read_retries", &self.max_read_retries)
            .finish()
    }
}

impl AssistantsConfig {
    pub fn new(api_key: impl Into<String>, auth_method: AuthMethod) -> Self {
        Self {
            api_key: api_key.into(),
            auth_method,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            max_read_retries: 2,
        }
    }

    /// Build from the `[remote]` config section (env overrides already applied).
    pub fn from_settings(remote: &RemoteConfig) -> Result<Self, EngineError> {
        if remote.api_key.trim().is_empty() {
            return Err(EngineError::Auth(
                "API key not configured. Set BEACON_API_KEY, OPENAI_API_KEY, \
                 AZURE_OPENAI_API_KEY, or remote.api_key."
                    .into(),
            ));
        }

        let mut config = Self::new(remote.api_key.clone(), remote.auth.into())
            .with_base_url(remote.base_url.clone())
            .with_timeouts(
                Duration::from_secs(remote.connect_timeout_secs),
                Duration::from_secs(remote.request_timeout_secs),
            )
            .with_max_read_retries(remote.max_read_retries);
        if let Some(version) = &remote.api_version {
            config = config.with_api_version(version.clone());
        }
        Ok(config)
    }

    /// Create config from the environment alone.
    ///
    /// Resolution order:
    /// 1. `OPENAI_API_KEY` (bearer auth, `OPENAI_BASE_URL` optional)
    /// 2. `AZURE_OPENAI_API_KEY` + `AZURE_OPENAI_ENDPOINT` (Azure auth)
    pub fn from_env() -> Result<Self, EngineError> {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            let mut config = Self::new(key, AuthMethod::Bearer);
            if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
                config = config.with_base_url(url);
            }
            return Ok(config);
        }

        if let (Ok(key), Ok(endpoint)) = (
            std::env::var("AZURE_OPENAI_API_KEY"),
            std::env::var("AZURE_OPENAI_ENDPOINT"),
        ) {
            let base_url = format!("{}/openai", endpoint.trim_end_matches('/'));
            return Ok(Self::new(key, AuthMethod::AzureApiKey)
                .with_base_url(base_url)
                .with_api_version("2024-05-01-preview"));
        }

        Err(EngineError::Auth(
            "Assistants API not configured. Set OPENAI_API_KEY, or \
             AZURE_OPENAI_API_KEY and AZURE_OPENAI_ENDPOINT."
                .into(),
        ))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_max_read_retries(mut self, retries: u32) -> Self {
        self.max_read_retries = retries;
        self
    }
}
