//! Assistants API client struct, request building, and status mapping.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::EngineError;

use super::config::{AssistantsConfig, AuthMethod};

const ASSISTANTS_BETA: &str = "assistants=v2";
const READ_RETRY_STEP: Duration = Duration::from_millis(500);

/// Assistants API client.
pub struct OpenAiAssistantsClient {
    pub(crate) config: AssistantsConfig,
    pub(crate) http: reqwest::Client,
}

impl OpenAiAssistantsClient {
    pub fn new(config: AssistantsConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, http }
    }

    /// Full URL for an API path such as `/threads`.
    pub(crate) fn url(&self, path: &str) -> String {
        match &self.config.api_version {
            Some(version) => format!("{}{path}?api-version={version}", self.config.base_url),
            None => format!("{}{path}", self.config.base_url),
        }
    }

    /// Start a request with auth and beta headers applied.
    pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header("OpenAI-Beta", ASSISTANTS_BETA);
        match self.config.auth_method {
            AuthMethod::Bearer => builder.bearer_auth(&self.config.api_key),
            AuthMethod::AzureApiKey => builder.header("api-key", &self.config.api_key),
        }
    }

    /// Send a request and map transport and status failures.
    pub(crate) async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, EngineError> {
        let response = request.send().await.map_err(map_transport_error)?;
        check_status(response).await
    }

    /// Send a request and decode the JSON body.
    pub(crate) async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, EngineError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))
    }
}

pub(crate) fn map_transport_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout
    } else {
        EngineError::Network(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(status_error(status, &text))
}

pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> EngineError {
    match status {
        reqwest::StatusCode::TOO_MANY_REQUESTS => EngineError::RateLimited,
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            EngineError::Auth(format!("HTTP {status}"))
        }
        _ => {
            let text = body.chars().take(200).collect::<String>();
            EngineError::Api(format!("HTTP {status}: {text}"))
        }
    }
}

/// Run an idempotent read, retrying transient failures with linear backoff.
///
/// Only reads go through here; thread and run creation are never retried.
pub(crate) async fn retry_read<T, F, Fut>(
    what: &str,
    max_retries: u32,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = READ_RETRY_STEP * attempt;
                warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient read failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
