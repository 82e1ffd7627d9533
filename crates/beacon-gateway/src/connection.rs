//! Per-connection handler: parse requests, run them against the engine,
//! stream replies back.

use std::net::SocketAddr;
use std::sync::Arc;

use beacon_common::SessionId;
use beacon_engine::{RunObserver, TurnOrchestrator, TurnRequest};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ClientMessage, ServerMessage};

type Outbound = mpsc::Sender<Message>;

/// Handle a single WebSocket connection.
///
/// Each request runs as its own task so deltas keep streaming while the
/// socket is read. Requests still in flight when the client disconnects
/// are cancelled.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    orchestrator: Arc<TurnOrchestrator>,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Message>(256);
    let cancel = CancellationToken::new();

    tracing::info!(peer = %addr, "Client connected");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(request) => {
                    let orchestrator = orchestrator.clone();
                    let tx = tx.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        let reply = handle_request(&orchestrator, request, &tx, &cancel).await;
                        send(&tx, &reply).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(peer = %addr, error = %e, "Invalid request");
                    send(&tx, &ServerMessage::error(None, format!("invalid request: {e}"))).await;
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = tx.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(peer = %addr, error = %e, "WS error");
                break;
            }
            _ => {}
        }
    }

    tracing::info!(peer = %addr, "Client disconnected");
    cancel.cancel();
    drop(tx);
    let _ = writer.await;
}

async fn handle_request(
    orchestrator: &TurnOrchestrator,
    request: ClientMessage,
    tx: &Outbound,
    cancel: &CancellationToken,
) -> ServerMessage {
    match request {
        ClientMessage::SendMessage {
            session_id,
            message,
        } => {
            let session_id = session_id.unwrap_or_default();
            let observer = DeltaForwarder {
                session_id: session_id.clone(),
                tx: tx.clone(),
            };
            let request = TurnRequest::new(Some(session_id.clone()), message);
            match orchestrator.run_turn(request, &observer, cancel).await {
                Ok(response) => response.into(),
                Err(e) => ServerMessage::error(Some(session_id), e),
            }
        }
        ClientMessage::EndSession { session_id } => {
            let removed = orchestrator.remove_session(&session_id).await;
            ServerMessage::SessionEnded {
                session_id,
                removed,
            }
        }
        ClientMessage::TokenCount { session_id } => {
            match orchestrator.token_usage(&session_id).await {
                Ok(tracker) => ServerMessage::TokenCount {
                    input_tokens: tracker.total().input_tokens,
                    output_tokens: tracker.total().output_tokens,
                    total_tokens: tracker.total_tokens(),
                    runs: tracker.run_count(),
                    session_id,
                },
                Err(e) => ServerMessage::error(Some(session_id), e),
            }
        }
        ClientMessage::AttachFile {
            session_id,
            file_id,
        } => match orchestrator.swap_context_file(&session_id, &file_id).await {
            Ok(swap) => ServerMessage::FileAttached {
                session_id,
                file_id,
                vector_store_id: swap.vector_store_id,
                replaced_file_id: swap.replaced_file_id,
            },
            Err(e) => ServerMessage::error(Some(session_id), e),
        },
    }
}

/// Streams assistant text to the client as it arrives.
struct DeltaForwarder {
    session_id: SessionId,
    tx: Outbound,
}

impl RunObserver for DeltaForwarder {
    fn on_text(&self, fragment: &str) {
        let delta = ServerMessage::Delta {
            session_id: self.session_id.clone(),
            content: fragment.to_string(),
        };
        if self.tx.try_send(Message::Text(delta.to_json().into())).is_err() {
            tracing::debug!(session = %self.session_id, "Delta dropped, client backlogged");
        }
    }
}

async fn send(tx: &Outbound, msg: &ServerMessage) {
    let _ = tx.send(Message::Text(msg.to_json().into())).await;
}
