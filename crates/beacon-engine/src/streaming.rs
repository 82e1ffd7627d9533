//! Server-Sent Events (SSE) streaming parser.
//!
//! Assistant runs are delivered as SSE. This module turns any buffered
//! byte reader (usually a reqwest response body) into a lazy stream of
//! `SseEvent`s that is polled one event at a time.

use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;

use crate::EngineError;

/// A single SSE event parsed from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (e.g., "thread.message.delta", "done").
    pub event: Option<String>,
    /// The event data (usually JSON).
    pub data: String,
}

/// Decode SSE events from a buffered reader.
pub fn decode_sse<R>(reader: R) -> impl Stream<Item = Result<SseEvent, EngineError>> + Send
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    futures_util::stream::unfold(Some(reader.lines()), |state| async move {
        let mut lines = state?;
        let mut current_event: Option<String> = None;
        let mut current_data = String::new();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    // Flush any remaining event
                    if current_data.is_empty() {
                        return None;
                    }
                    let event = SseEvent {
                        event: current_event,
                        data: current_data,
                    };
                    return Some((Ok(event), None));
                }
                Err(e) => return Some((Err(EngineError::Network(e.to_string())), None)),
            };

            if line.is_empty() {
                // Empty line = end of event
                if !current_data.is_empty() {
                    let event = SseEvent {
                        event: current_event.take(),
                        data: std::mem::take(&mut current_data),
                    };
                    return Some((Ok(event), Some(lines)));
                }
                current_event = None;
                continue;
            }

            if let Some(event_type) = field(&line, "event") {
                current_event = Some(event_type.to_string());
            } else if let Some(data) = field(&line, "data") {
                if !current_data.is_empty() {
                    current_data.push('\n');
                }
                current_data.push_str(data);
            }
            // Ignore other fields (id:, retry:, comments)
        }
    })
}

/// Decode SSE events from a streaming HTTP response body.
pub fn response_events(
    response: reqwest::Response,
) -> impl Stream<Item = Result<SseEvent, EngineError>> + Send {
    let byte_stream = response
        .bytes_stream()
        .map(|result| result.map_err(std::io::Error::other));
    let reader = tokio::io::BufReader::new(StreamReader::new(Box::pin(byte_stream)));
    decode_sse(reader)
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let value = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}
