//! Conversation engine for Beacon.
//!
//! Drives an assistant "thread + streaming run" service on behalf of
//! application sessions:
//! - Session-to-thread affinity with TTL and capacity bounds
//! - Streaming run reduction (text, image placeholders, failures, pauses)
//! - Tool-call dispatch through a name-keyed command registry
//! - Turn orchestration across any number of pause/resume rounds
//! - Token accounting and context-file attachment

pub mod commands;
pub mod dispatch;
pub mod openai;
pub mod orchestrator;
pub mod reducer;
pub mod repository;
pub mod session;
pub mod streaming;
pub mod timeseries;
pub mod token_tracker;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

pub use commands::{CommandError, CommandRegistry, CommandResult, MessageContext};
pub use dispatch::ToolDispatcher;
pub use openai::{AssistantsConfig, OpenAiAssistantsClient};
pub use orchestrator::{ContextFileSwap, TurnOrchestrator, TurnOutcome, TurnRequest, TurnResponse};
pub use reducer::{NoopObserver, Reducer, RunObserver, RunOutcome, RunState};
pub use repository::{AssetRepository, InMemoryRepository};
pub use session::{SessionLease, SessionStore};
pub use timeseries::TimeSeriesStore;
pub use token_tracker::TokenTracker;

/// Prefix reserved for metadata keys the engine writes onto threads.
pub const ENGINE_METADATA_PREFIX: &str = "beacon.";

/// A lazy, unbounded sequence of run events.
pub type UpdateStream = BoxStream<'static, Result<StreamingUpdate, EngineError>>;

/// The remote assistant service this engine drives.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadHandle, EngineError>;

    async fn append_user_message(&self, thread_id: &str, text: &str) -> Result<(), EngineError>;

    async fn create_run_streaming(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<UpdateStream, EngineError>;

    /// Resume a paused run. The returned stream continues the same run.
    async fn submit_tool_outputs_streaming(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<UpdateStream, EngineError>;

    /// Cancel a run, e.g. one left paused waiting for tool outputs.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), EngineError>;

    async fn delete_thread(&self, thread_id: &str) -> Result<(), EngineError>;

    /// Token usage of every run on the thread, newest first.
    async fn runs_usage(&self, thread_id: &str) -> Result<Vec<TokenUsage>, EngineError>;

    async fn modify_thread(
        &self,
        thread_id: &str,
        metadata: &HashMap<String, String>,
        vector_store_ids: &[String],
    ) -> Result<(), EngineError>;

    /// Create a vector store seeded with `file_ids`, returning its id.
    async fn create_vector_store(&self, file_ids: &[String]) -> Result<String, EngineError>;

    async fn add_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), EngineError>;

    async fn remove_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), EngineError>;

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<(), EngineError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), EngineError>;
}

/// Remote conversation thread: an opaque id plus string metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadHandle {
    pub id: String,
    pub metadata: HashMap<String, String>,
}

impl ThreadHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: HashMap::new(),
        }
    }

    /// Read an engine-private metadata value (`name` without prefix).
    pub fn private(&self, name: &str) -> Option<&str> {
        self.metadata
            .get(&private_key(name))
            .map(String::as_str)
    }

    pub fn set_private(&mut self, name: &str, value: impl Into<String>) {
        self.metadata.insert(private_key(name), value.into());
    }

    /// Metadata visible to users, with engine bookkeeping filtered out.
    pub fn user_metadata(&self) -> impl Iterator<Item = (&String, &String)> {
        self.metadata
            .iter()
            .filter(|(key, _)| !key.starts_with(ENGINE_METADATA_PREFIX))
    }
}

pub(crate) fn private_key(name: &str) -> String {
    format!("{ENGINE_METADATA_PREFIX}{name}")
}

/// One function call a paused run is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequiredAction {
    pub tool_call_id: String,
    pub function_name: String,
    pub raw_arguments: String,
}

/// The result of one required action, as submitted back to the run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentDelta {
    Text(String),
    ImageFile { file_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

/// A single decoded event from a streaming run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingUpdate {
    MessageCreated {
        message_id: String,
        role: MessageRole,
    },
    ContentDelta(ContentDelta),
    /// The run paused; every tool call it is waiting on arrives in one batch.
    RequiresAction {
        run_id: String,
        actions: Vec<RequiredAction>,
    },
    RunFailed {
        run_id: String,
        error: Option<RunError>,
    },
    RunCompleted {
        run_id: String,
        usage: Option<TokenUsage>,
    },
    Done,
    Ignored(String),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Render as an Assistants API function tool.
    pub fn to_function_tool(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Infrastructure failures. These reach the caller; model-level run
/// failures never do.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited")]
    RateLimited,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("session {session_id} unavailable: {source}")]
    SessionUnavailable {
        session_id: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("no assistant id configured")]
    MissingAssistant,
    #[error("turn cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether an idempotent read may be retried after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Network(_) | EngineError::Timeout | EngineError::RateLimited
        )
    }
}

impl From<EngineError> for beacon_common::BeaconError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Network(msg) => beacon_common::BeaconError::Network(msg),
            other => beacon_common::BeaconError::Engine(other.to_string()),
        }
    }
}

/// Await `fut` unless `cancel` fires first.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        result = fut => result,
    }
}
