//! Turn orchestration: one user message in, one assistant reply out.
//!
//! A turn resolves the session's thread, appends the message, starts a
//! run and keeps feeding the run's stream through the [`Reducer`]. Every
//! pause is handed to the [`ToolDispatcher`], whose resumed stream feeds
//! the next round, until the run completes or fails. Model-level failures
//! come back as ordinary content; transport failures are errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use beacon_common::{new_correlation_id, SessionId};
use beacon_config::BeaconConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{CommandRegistry, CommandResult, MessageContext};
use crate::dispatch::ToolDispatcher;
use crate::reducer::{Reducer, RunObserver, RunOutcome, RunState};
use crate::session::{SessionLease, SessionStore};
use crate::token_tracker::TokenTracker;
use crate::{private_key, until_cancelled, AssistantApi, EngineError, TokenUsage};

const VECTOR_STORE_KEY: &str = "vector_store_id";
const CONTEXT_FILE_KEY: &str = "context_file_id";

const DEFAULT_FILE_ROUTE: &str = "/api/file";
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// `None` runs the turn on a one-shot thread that is deleted afterwards.
    pub session_id: Option<SessionId>,
    pub message: String,
    /// Overrides the orchestrator's default assistant.
    pub assistant_id: Option<String>,
}

impl TurnRequest {
    pub fn new(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self {
            session_id,
            message: message.into(),
            assistant_id: None,
        }
    }

    pub fn with_assistant(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// The run failed; the reason is also part of the content.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub content: String,
    /// Session the turn ran on. For a request without a session id this
    /// names a one-shot thread that is already deleted; it cannot be
    /// resumed.
    pub session_id: SessionId,
    /// Results of every handled command across all pauses of the turn.
    pub command_results: Vec<CommandResult>,
    pub outcome: TurnOutcome,
    /// Usage reported by the turn's completed run, if any.
    pub usage: TokenUsage,
}

impl TurnResponse {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Failed(_))
    }
}

/// Result of attaching a context file to a session's thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFileSwap {
    pub vector_store_id: String,
    pub replaced_file_id: Option<String>,
}

pub struct TurnOrchestrator {
    api: Arc<dyn AssistantApi>,
    sessions: Arc<SessionStore>,
    dispatcher: ToolDispatcher,
    reducer: Reducer,
    assistant_id: Option<String>,
    /// Maximum pauses resolved per turn. Zero means unlimited.
    max_tool_rounds: u32,
}

impl TurnOrchestrator {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        sessions: Arc<SessionStore>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            dispatcher: ToolDispatcher::new(api.clone(), registry),
            api,
            sessions,
            reducer: Reducer::new(DEFAULT_FILE_ROUTE, DEFAULT_IDLE_TIMEOUT),
            assistant_id: None,
            max_tool_rounds: 0,
        }
    }

    pub fn from_settings(
        api: Arc<dyn AssistantApi>,
        sessions: Arc<SessionStore>,
        registry: Arc<CommandRegistry>,
        config: &BeaconConfig,
    ) -> Self {
        Self::new(api, sessions, registry)
            .with_assistant_id(config.remote.assistant_id.clone())
            .with_max_tool_rounds(config.dispatch.max_tool_rounds)
            .with_reducer(Reducer::from_settings(&config.remote, &config.gateway))
    }

    /// Default assistant for requests that name none. Blank clears it.
    pub fn with_assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        let assistant_id = assistant_id.into();
        self.assistant_id = (!assistant_id.trim().is_empty()).then_some(assistant_id);
        self
    }

    pub fn with_max_tool_rounds(mut self, max: u32) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn registry(&self) -> &CommandRegistry {
        self.dispatcher.registry()
    }

    /// Run one conversational turn.
    ///
    /// Turns on the same session are serialized; turns on different
    /// sessions run independently. Cancellation stops observing the run
    /// and returns [`EngineError::Cancelled`]; a streaming run is left to
    /// finish server-side.
    ///
    /// A run abandoned while paused for tool outputs (round limit reached,
    /// cancelled or failed mid-batch) is cancelled remotely so the thread
    /// accepts new messages. If that cancel fails the session is retired.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        observer: &dyn RunObserver,
        cancel: &CancellationToken,
    ) -> Result<TurnResponse, EngineError> {
        let assistant_id = request
            .assistant_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.assistant_id.clone())
            .ok_or(EngineError::MissingAssistant)?;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let lease = self.sessions.get_or_create_thread(request.session_id).await?;

        let turn = new_correlation_id();
        let result = match until_cancelled(cancel, async { Ok(lease.lock_turn().await) }).await {
            Ok(guard) => {
                info!(
                    turn = %turn,
                    session = %lease.session_id(),
                    thread = %lease.thread_id(),
                    "turn started"
                );
                let mut paused_run = None;
                let result = self
                    .drive(&lease, &assistant_id, &request.message, observer, cancel, &mut paused_run)
                    .await;
                if let Some(run_id) = paused_run.filter(|_| lease.is_cached()) {
                    if !self.cancel_paused_run(&lease, &run_id).await {
                        drop(guard);
                        self.sessions.remove_thread(lease.session_id()).await;
                    }
                }
                result
            }
            Err(e) => Err(e),
        };

        if !lease.is_cached() {
            if let Err(e) = self.api.delete_thread(lease.thread_id()).await {
                warn!(turn = %turn, thread = %lease.thread_id(), error = %e, "failed to delete one-shot thread");
            }
        }

        match &result {
            Ok(response) => info!(
                turn = %turn,
                results = response.command_results.len(),
                failed = response.is_failed(),
                "turn finished"
            ),
            Err(e) => warn!(turn = %turn, error = %e, "turn aborted"),
        }
        result
    }

    async fn drive(
        &self,
        lease: &SessionLease,
        assistant_id: &str,
        message: &str,
        observer: &dyn RunObserver,
        cancel: &CancellationToken,
        paused_run: &mut Option<String>,
    ) -> Result<TurnResponse, EngineError> {
        let thread_id = lease.thread_id();
        let prompt = append_prompt_metadata(message, Utc::now());
        until_cancelled(cancel, self.api.append_user_message(thread_id, &prompt)).await?;

        let mut stream = until_cancelled(
            cancel,
            self.api.create_run_streaming(thread_id, assistant_id),
        )
        .await?;

        let mut state = RunState::default();
        let mut ctx = MessageContext::default();
        let mut command_results = Vec::new();
        let mut rounds = 0u32;

        let outcome = loop {
            match self.reducer.drive(stream, &mut state, observer, cancel).await? {
                RunOutcome::Completed => break TurnOutcome::Completed,
                RunOutcome::Failed(reason) => break TurnOutcome::Failed(reason),
                RunOutcome::Paused { run_id, actions } => {
                    *paused_run = Some(run_id.clone());
                    rounds += 1;
                    if self.max_tool_rounds > 0 && rounds > self.max_tool_rounds {
                        warn!(run = %run_id, rounds = self.max_tool_rounds, "tool round limit reached");
                        let reason = format!("Tool round limit ({}) reached", self.max_tool_rounds);
                        state.fail(reason.clone(), observer);
                        break TurnOutcome::Failed(reason);
                    }
                    debug!(run = %run_id, round = rounds, actions = actions.len(), "resolving pause");
                    let (next, results) = self
                        .dispatcher
                        .resolve(thread_id, &run_id, &actions, &mut ctx, cancel)
                        .await?;
                    *paused_run = None;
                    command_results.extend(results);
                    stream = next;
                }
            }
        };

        Ok(TurnResponse {
            content: state.text,
            session_id: lease.session_id().clone(),
            command_results,
            outcome,
            usage: state.usage,
        })
    }

    /// Cancel a run left waiting for tool outputs. Returns false when the
    /// thread may still be blocked by it.
    async fn cancel_paused_run(&self, lease: &SessionLease, run_id: &str) -> bool {
        match self.api.cancel_run(lease.thread_id(), run_id).await {
            Ok(()) => {
                info!(session = %lease.session_id(), run = %run_id, "cancelled paused run");
                true
            }
            Err(e) => {
                warn!(
                    session = %lease.session_id(),
                    thread = %lease.thread_id(),
                    run = %run_id,
                    error = %e,
                    "failed to cancel paused run, retiring session"
                );
                false
            }
        }
    }

    /// Forget a session and delete its thread. Waits for an in-flight turn.
    pub async fn remove_session(&self, session_id: &SessionId) -> bool {
        self.sessions.remove_thread(session_id).await
    }

    /// Drop expired sessions, returning how many were removed.
    pub async fn reap_expired(&self) -> usize {
        self.sessions.reap_expired().await
    }

    /// Token usage summed over every run on the session's thread.
    pub async fn token_usage(&self, session_id: &SessionId) -> Result<TokenTracker, EngineError> {
        let lease = self.cached(session_id).await?;
        let runs = self.api.runs_usage(lease.thread_id()).await?;
        Ok(TokenTracker::from_runs(&runs))
    }

    /// Make `file_id` the session's single context file.
    ///
    /// The first call creates a vector store holding the file and attaches
    /// it to the thread. Later calls add the new file to that store before
    /// removing and deleting the previous one, so a failed call leaves the
    /// previous file in place and can be retried.
    pub async fn swap_context_file(
        &self,
        session_id: &SessionId,
        file_id: &str,
    ) -> Result<ContextFileSwap, EngineError> {
        let lease = self.cached(session_id).await?;
        let _guard = lease.lock_turn().await;
        let handle = lease.handle();
        let thread_id = lease.thread_id();

        let current = handle.private(CONTEXT_FILE_KEY).map(str::to_string);
        let previous = current.clone().filter(|prev| prev != file_id);

        let (vector_store_id, created) = match handle.private(VECTOR_STORE_KEY) {
            Some(vector_store_id) => {
                if current.as_deref() != Some(file_id) {
                    self.api.add_vector_store_file(vector_store_id, file_id).await?;
                    lease.set_private(CONTEXT_FILE_KEY, file_id);
                }
                if let Some(prev) = &previous {
                    self.retire_context_file(vector_store_id, prev).await;
                }
                (vector_store_id.to_string(), false)
            }
            None => (self.api.create_vector_store(&[file_id.to_string()]).await?, true),
        };

        let mut metadata: HashMap<String, String> = handle.metadata.clone();
        metadata.insert(private_key(VECTOR_STORE_KEY), vector_store_id.clone());
        metadata.insert(private_key(CONTEXT_FILE_KEY), file_id.to_string());
        if let Err(e) = self
            .api
            .modify_thread(thread_id, &metadata, std::slice::from_ref(&vector_store_id))
            .await
        {
            if created {
                if let Err(cleanup) = self.api.delete_vector_store(&vector_store_id).await {
                    warn!(thread = %thread_id, vector_store = %vector_store_id, error = %cleanup, "failed to delete unattached vector store");
                }
            }
            return Err(e);
        }

        lease.set_private(VECTOR_STORE_KEY, &vector_store_id);
        lease.set_private(CONTEXT_FILE_KEY, file_id);
        info!(session = %session_id, thread = %thread_id, file = %file_id, "context file attached");

        Ok(ContextFileSwap {
            vector_store_id,
            replaced_file_id: previous,
        })
    }

    /// Best-effort removal of a replaced context file.
    async fn retire_context_file(&self, vector_store_id: &str, file_id: &str) {
        if let Err(e) = self.api.remove_vector_store_file(vector_store_id, file_id).await {
            warn!(vector_store = %vector_store_id, file = %file_id, error = %e, "failed to detach replaced context file");
        }
        if let Err(e) = self.api.delete_file(file_id).await {
            warn!(file = %file_id, error = %e, "failed to delete replaced context file");
        }
    }

    async fn cached(&self, session_id: &SessionId) -> Result<SessionLease, EngineError> {
        self.sessions
            .lookup(session_id)
            .await
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))
    }
}

/// Suffix the message with the current time so the model has temporal
/// grounding.
pub fn append_prompt_metadata(message: &str, now: DateTime<Utc>) -> String {
    format!(
        "{message}\n---\nCurrent time: {}",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

#[cfg(test)]
mod tests;
