//! Remote assistant service connection settings.

use serde::{Deserialize, Serialize, Serializer};

/// How requests authenticate with the remote service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum RemoteAuth {
    /// `Authorization: Bearer <key>` (OpenAI and compatible services).
    #[default]
    Bearer,
    /// `api-key: <key>` (Azure OpenAI deployments).
    AzureApiKey,
}

/// Connection to the thread + streaming-run assistant service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth: RemoteAuth,
    /// Empty means "resolve from the environment".
    #[serde(serialize_with = "redact")]
    pub api_key: String,
    /// Sent as the `api-version` query parameter when set.
    pub api_version: Option<String>,
    /// Assistant used when a turn does not name one.
    pub assistant_id: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// A run stream silent for longer than this is treated as failed.
    pub stream_idle_timeout_secs: u64,
    /// Retries for idempotent reads only.
    pub max_read_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            auth: RemoteAuth::Bearer,
            api_key: String::new(),
            api_version: None,
            assistant_id: String::new(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            stream_idle_timeout_secs: 90,
            max_read_retries: 2,
        }
    }
}

fn redact<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str("[REDACTED]")
    }
}
