//! Terminal chat: the same turn loop as the WebSocket path, with stdin and
//! stdout as the client.

use std::io::Write;
use std::sync::Arc;

use beacon_common::{BeaconError, SessionId};
use beacon_engine::{RunObserver, TurnOrchestrator, TurnRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

struct StdoutObserver;

impl RunObserver for StdoutObserver {
    fn on_text(&self, fragment: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(fragment.as_bytes());
        let _ = out.flush();
    }
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(b"\n> ");
    let _ = out.flush();
}

/// Chat until EOF, `exit`, or Ctrl-C, then delete the conversation's thread.
pub async fn run_chat(orchestrator: Arc<TurnOrchestrator>) -> Result<(), BeaconError> {
    let session_id = SessionId::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!(session = %session_id, "Console chat started");
    println!("Chatting with the assistant. Type 'exit' to quit.");

    let result = loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break Ok(()),
        };
        let message = match line {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => break Ok(()),
            Err(e) => break Err(BeaconError::Io(e)),
        };
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message.to_lowercase().as_str()) {
            break Ok(());
        }

        let cancel = CancellationToken::new();
        let request = TurnRequest::new(Some(session_id.clone()), message);
        let turn = tokio::select! {
            turn = orchestrator.run_turn(request, &StdoutObserver, &cancel) => turn,
            _ = tokio::signal::ctrl_c() => break Ok(()),
        };

        match turn {
            Ok(response) => {
                println!();
                for result in &response.command_results {
                    println!("[{}] {}", result.command, result.data);
                }
            }
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "Turn failed");
                eprintln!("\nerror: {e}");
            }
        }
    };

    orchestrator.remove_session(&session_id).await;
    tracing::info!(session = %session_id, "Console chat ended");
    result
}
