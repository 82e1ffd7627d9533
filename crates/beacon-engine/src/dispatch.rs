//! Tool dispatch: turn a paused run's required actions into tool outputs
//! and resume the run.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::commands::{CommandError, CommandRegistry, CommandResult, MessageContext};
use crate::{until_cancelled, AssistantApi, EngineError, RequiredAction, ToolOutput, UpdateStream};

/// Payload submitted for a function nothing is registered under.
const EMPTY_PAYLOAD: &str = "{}";

/// Outputs for one pause, in action order, plus the results of every
/// action a handler completed.
#[derive(Debug, Default)]
pub struct DispatchBatch {
    pub outputs: Vec<ToolOutput>,
    pub results: Vec<CommandResult>,
}

pub struct ToolDispatcher {
    api: Arc<dyn AssistantApi>,
    registry: Arc<CommandRegistry>,
}

impl ToolDispatcher {
    pub fn new(api: Arc<dyn AssistantApi>, registry: Arc<CommandRegistry>) -> Self {
        Self { api, registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run every action's handler in order and submit all outputs in one
    /// call, returning the resumed run's stream.
    pub async fn resolve(
        &self,
        thread_id: &str,
        run_id: &str,
        actions: &[RequiredAction],
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<(UpdateStream, Vec<CommandResult>), EngineError> {
        let batch = self.execute(actions, ctx, cancel).await?;
        debug!(run = %run_id, outputs = batch.outputs.len(), "submitting tool outputs");
        let stream = until_cancelled(
            cancel,
            self.api
                .submit_tool_outputs_streaming(thread_id, run_id, &batch.outputs),
        )
        .await?;
        Ok((stream, batch.results))
    }

    /// Execute actions sequentially so later handlers see context written
    /// by earlier ones. Handler failures never escape; they become
    /// payloads the model can read.
    pub async fn execute(
        &self,
        actions: &[RequiredAction],
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<DispatchBatch, EngineError> {
        let mut batch = DispatchBatch::default();

        for action in actions {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let name = action.function_name.as_str();
            let payload = match self.registry.resolve(name) {
                Err(e) => {
                    warn!(tool = %name, call = %action.tool_call_id, "{e}");
                    EMPTY_PAYLOAD.to_string()
                }
                Ok(handler) => {
                    debug!(tool = %name, call = %action.tool_call_id, "executing command");
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                        outcome = handler.handle(&action.raw_arguments, ctx) => outcome,
                    };
                    match outcome {
                        Ok(data) => {
                            let payload = data.to_string();
                            batch.results.push(CommandResult {
                                command: name.to_string(),
                                data,
                            });
                            payload
                        }
                        Err(e) => {
                            warn!(tool = %name, call = %action.tool_call_id, error = %e, "command failed");
                            error_payload(&e)
                        }
                    }
                }
            };

            batch.outputs.push(ToolOutput {
                tool_call_id: action.tool_call_id.clone(),
                payload,
            });
        }

        Ok(batch)
    }
}

fn error_payload(err: &CommandError) -> String {
    json!({ "error": err.to_string() }).to_string()
}
