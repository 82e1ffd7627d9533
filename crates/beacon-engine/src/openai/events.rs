//! Translation of Assistants SSE events into `StreamingUpdate`s.

use serde_json::Value;
use tracing::debug;

use crate::streaming::SseEvent;
use crate::{
    ContentDelta, EngineError, MessageRole, RequiredAction, RunError, StreamingUpdate, TokenUsage,
};

/// Translate one SSE event. A message delta may carry several content
/// parts, so one event can yield several updates.
pub fn translate_event(event: &SseEvent) -> Result<Vec<StreamingUpdate>, EngineError> {
    let kind = event.event.as_deref().unwrap_or("");

    if kind == "done" {
        return Ok(vec![StreamingUpdate::Done]);
    }

    let data: Value = match serde_json::from_str(&event.data) {
        Ok(data) => data,
        Err(e) if kind == "error" => {
            debug!(parse_error = %e, "non-JSON stream error payload");
            return Err(EngineError::Api(format!("stream error: {}", event.data.trim())));
        }
        Err(e) => {
            return Err(EngineError::Parse(format!(
                "invalid JSON in {kind} event: {e}"
            )))
        }
    };

    let update = match kind {
        "thread.message.created" => {
            let role = match data["role"].as_str() {
                Some("user") => MessageRole::User,
                _ => MessageRole::Assistant,
            };
            StreamingUpdate::MessageCreated {
                message_id: str_field(&data, "id"),
                role,
            }
        }
        "thread.message.delta" => return Ok(content_deltas(&data)),
        "thread.run.requires_action" => StreamingUpdate::RequiresAction {
            run_id: str_field(&data, "id"),
            actions: required_actions(&data),
        },
        "thread.run.failed" => StreamingUpdate::RunFailed {
            run_id: str_field(&data, "id"),
            error: data
                .get("last_error")
                .filter(|e| !e.is_null())
                .map(|e| RunError {
                    code: e["code"].as_str().unwrap_or("").to_string(),
                    message: e["message"].as_str().unwrap_or("").to_string(),
                }),
        },
        "thread.run.cancelled" | "thread.run.expired" | "thread.run.incomplete" => {
            let status = kind.trim_start_matches("thread.run.");
            let message = match data["incomplete_details"]["reason"].as_str() {
                Some(reason) => format!("Run {status}: {reason}"),
                None => format!("Run {status}"),
            };
            StreamingUpdate::RunFailed {
                run_id: str_field(&data, "id"),
                error: Some(RunError {
                    code: status.to_string(),
                    message,
                }),
            }
        }
        "thread.run.completed" => StreamingUpdate::RunCompleted {
            run_id: str_field(&data, "id"),
            usage: parse_usage(&data["usage"]),
        },
        "error" => {
            let message = data["message"]
                .as_str()
                .or_else(|| data["error"]["message"].as_str())
                .unwrap_or("unknown stream error");
            return Err(EngineError::Api(format!("stream error: {message}")));
        }
        other => StreamingUpdate::Ignored(other.to_string()),
    };

    Ok(vec![update])
}

/// Parse a run's `usage` object, if present.
pub(crate) fn parse_usage(usage: &Value) -> Option<TokenUsage> {
    if !usage.is_object() {
        return None;
    }
    Some(TokenUsage {
        input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
    })
}

fn str_field(data: &Value, key: &str) -> String {
    data[key].as_str().unwrap_or("").to_string()
}

fn content_deltas(data: &Value) -> Vec<StreamingUpdate> {
    let Some(parts) = data["delta"]["content"].as_array() else {
        return Vec::new();
    };

    parts
        .iter()
        .filter_map(|part| match part["type"].as_str() {
            Some("text") => part["text"]["value"]
                .as_str()
                .filter(|t| !t.is_empty())
                .map(|t| ContentDelta::Text(t.to_string())),
            Some("image_file") => part["image_file"]["file_id"]
                .as_str()
                .map(|id| ContentDelta::ImageFile {
                    file_id: id.to_string(),
                }),
            _ => None,
        })
        .map(StreamingUpdate::ContentDelta)
        .collect()
}

fn required_actions(run: &Value) -> Vec<RequiredAction> {
    run["required_action"]["submit_tool_outputs"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter(|c| c["type"] == "function")
                .map(|c| RequiredAction {
                    tool_call_id: str_field(c, "id"),
                    function_name: c["function"]["name"].as_str().unwrap_or("").to_string(),
                    raw_arguments: c["function"]["arguments"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
