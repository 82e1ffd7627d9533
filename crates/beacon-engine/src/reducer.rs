//! Streaming run reducer.
//!
//! Folds one run's event stream into accumulated text plus either a batch
//! of pending tool calls (the run paused) or a terminal outcome. Events
//! are applied strictly one at a time in arrival order; the next event is
//! only requested once the previous one has been fully applied.

use std::time::Duration;

use beacon_config::schema::{GatewayConfig, RemoteConfig};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    ContentDelta, EngineError, MessageRole, RequiredAction, StreamingUpdate, TokenUsage,
    UpdateStream,
};

const UNKNOWN_ERROR: &str = "Unknown error";
const ENDED_WITHOUT_RESULT: &str = "Run ended without completing";
const IDLE_TIMEOUT: &str = "Run stream timed out";

/// Receives run progress as it streams. All methods default to no-ops.
pub trait RunObserver: Send + Sync {
    /// A new assistant message started.
    fn on_message_created(&self, _message_id: &str) {}
    /// A text fragment (or image placeholder) was appended.
    fn on_text(&self, _fragment: &str) {}
    /// The run paused and asked for this tool call.
    fn on_tool_call(&self, _action: &RequiredAction) {}
}

pub struct NoopObserver;

impl RunObserver for NoopObserver {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Terminal {
    #[default]
    None,
    Completed,
    Failed(String),
}

/// Per-turn state. Text accumulates across every pause of the turn.
#[derive(Debug, Default)]
pub struct RunState {
    pub text: String,
    pub terminal: Terminal,
    /// Usage reported by completed runs during the turn.
    pub usage: TokenUsage,
}

impl RunState {
    /// Record a failure: `[Error] <reason>` is appended to the text.
    pub(crate) fn fail(&mut self, reason: impl Into<String>, observer: &dyn RunObserver) -> RunOutcome {
        let reason = reason.into();
        let fragment = format!("[Error] {reason}");
        observer.on_text(&fragment);
        self.text.push_str(&fragment);
        self.terminal = Terminal::Failed(reason.clone());
        RunOutcome::Failed(reason)
    }
}

/// How one run stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Paused {
        run_id: String,
        actions: Vec<RequiredAction>,
    },
    Failed(String),
}

enum Flow {
    Continue,
    Stop(RunOutcome),
}

pub struct Reducer {
    file_route: String,
    idle_timeout: Duration,
}

impl Reducer {
    /// `file_route` prefixes image placeholders, e.g. `/api/file`.
    pub fn new(file_route: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            file_route: file_route.into().trim_end_matches('/').to_string(),
            idle_timeout,
        }
    }

    pub fn from_settings(remote: &RemoteConfig, gateway: &GatewayConfig) -> Self {
        Self::new(
            gateway.file_route.clone(),
            Duration::from_secs(remote.stream_idle_timeout_secs),
        )
    }

    /// Placeholder a renderer resolves to the image behind `file_id`.
    pub fn image_placeholder(&self, file_id: &str) -> String {
        format!("{{{{image:{}/{file_id}}}}}", self.file_route)
    }

    /// Consume `stream` until the run pauses or ends.
    ///
    /// A stream that ends, or stays silent past the idle timeout, without
    /// a completion or failure event is a failed run. Transport errors
    /// inside the stream and cancellation are returned as errors.
    pub async fn drive(
        &self,
        mut stream: UpdateStream,
        state: &mut RunState,
        observer: &dyn RunObserver,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                next = tokio::time::timeout(self.idle_timeout, stream.next()) => next,
            };

            let update = match next {
                Err(_elapsed) => {
                    warn!(timeout_secs = self.idle_timeout.as_secs(), "run stream idle timeout");
                    return Ok(state.fail(IDLE_TIMEOUT, observer));
                }
                Ok(None) => return Ok(state.fail(ENDED_WITHOUT_RESULT, observer)),
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(update))) => update,
            };

            if let Flow::Stop(outcome) = self.apply(state, update, observer) {
                return Ok(outcome);
            }
        }
    }

    fn apply(&self, state: &mut RunState, update: StreamingUpdate, observer: &dyn RunObserver) -> Flow {
        match update {
            StreamingUpdate::MessageCreated { message_id, role } => {
                if role == MessageRole::Assistant {
                    observer.on_message_created(&message_id);
                }
                Flow::Continue
            }
            StreamingUpdate::ContentDelta(delta) => {
                let fragment = match delta {
                    ContentDelta::Text(text) => text,
                    ContentDelta::ImageFile { file_id } => self.image_placeholder(&file_id),
                };
                observer.on_text(&fragment);
                state.text.push_str(&fragment);
                Flow::Continue
            }
            StreamingUpdate::RequiresAction { run_id, actions } => {
                debug!(run = %run_id, actions = actions.len(), "run requires action");
                for action in &actions {
                    observer.on_tool_call(action);
                }
                Flow::Stop(RunOutcome::Paused { run_id, actions })
            }
            StreamingUpdate::RunFailed { run_id, error } => {
                let reason = error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                warn!(run = %run_id, reason = %reason, "run failed");
                Flow::Stop(state.fail(reason, observer))
            }
            StreamingUpdate::RunCompleted { run_id, usage } => {
                debug!(run = %run_id, "run completed");
                if let Some(usage) = usage {
                    state.usage.input_tokens += usage.input_tokens;
                    state.usage.output_tokens += usage.output_tokens;
                }
                state.terminal = Terminal::Completed;
                Flow::Stop(RunOutcome::Completed)
            }
            StreamingUpdate::Done => Flow::Stop(state.fail(ENDED_WITHOUT_RESULT, observer)),
            StreamingUpdate::Ignored(kind) => {
                debug!(event = %kind, "ignoring run event");
                Flow::Continue
            }
        }
    }
}
