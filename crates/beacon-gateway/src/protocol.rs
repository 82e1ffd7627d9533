//! Gateway wire protocol: one JSON object per WebSocket text frame,
//! discriminated by `type`.

use beacon_common::SessionId;
use beacon_engine::{CommandResult, TurnResponse};
use serde::{Deserialize, Serialize};

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Without a session id the gateway starts a new session.
    SendMessage {
        #[serde(default)]
        session_id: Option<SessionId>,
        message: String,
    },
    EndSession {
        session_id: SessionId,
    },
    TokenCount {
        session_id: SessionId,
    },
    AttachFile {
        session_id: SessionId,
        file_id: String,
    },
}

/// Messages the gateway sends back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Incremental assistant text while a turn is running.
    Delta {
        session_id: SessionId,
        content: String,
    },
    ChatResponse {
        content: String,
        session_id: SessionId,
        command_results: Vec<CommandResult>,
        /// The model run failed; `content` carries the error text.
        failed: bool,
    },
    TokenCount {
        session_id: SessionId,
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: u64,
        runs: u64,
    },
    SessionEnded {
        session_id: SessionId,
        removed: bool,
    },
    FileAttached {
        session_id: SessionId,
        file_id: String,
        vector_store_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        replaced_file_id: Option<String>,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(session_id: Option<SessionId>, message: impl ToString) -> Self {
        ServerMessage::Error {
            session_id,
            message: message.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"type\":\"error\",\"message\":\"encode failed: {e}\"}}"))
    }
}

impl From<TurnResponse> for ServerMessage {
    fn from(response: TurnResponse) -> Self {
        let failed = response.is_failed();
        ServerMessage::ChatResponse {
            content: response.content,
            session_id: response.session_id,
            command_results: response.command_results,
            failed,
        }
    }
}
