//! AssistantApi trait implementation for OpenAiAssistantsClient.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::streaming::response_events;
use crate::{
    AssistantApi, EngineError, ThreadHandle, TokenUsage, ToolOutput, UpdateStream,
};

use super::client::{retry_read, OpenAiAssistantsClient};
use super::events::{parse_usage, translate_event};

impl OpenAiAssistantsClient {
    /// POST a streaming request and decode its SSE body into updates.
    async fn open_stream(&self, path: &str, body: Value) -> Result<UpdateStream, EngineError> {
        let request = self
            .request(Method::POST, path)
            .header("Accept", "text/event-stream")
            .json(&body);
        let response = self.send(request).await?;

        let updates = response_events(response).flat_map(|event| {
            let items: Vec<Result<_, EngineError>> = match event {
                Ok(event) => match translate_event(&event) {
                    Ok(updates) => updates.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                },
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        });
        Ok(updates.boxed())
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistantsClient {
    async fn create_thread(&self) -> Result<ThreadHandle, EngineError> {
        let json = self
            .send_json(self.request(Method::POST, "/threads").json(&json!({})))
            .await?;

        let id = json["id"]
            .as_str()
            .ok_or_else(|| EngineError::Parse("thread response missing id".into()))?;
        let mut handle = ThreadHandle::new(id);
        if let Some(metadata) = json["metadata"].as_object() {
            for (key, value) in metadata {
                if let Some(value) = value.as_str() {
                    handle.metadata.insert(key.clone(), value.to_string());
                }
            }
        }
        debug!(thread = %handle.id, "created thread");
        Ok(handle)
    }

    async fn append_user_message(&self, thread_id: &str, text: &str) -> Result<(), EngineError> {
        let body = json!({ "role": "user", "content": text });
        self.send(
            self.request(Method::POST, &format!("/threads/{thread_id}/messages"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_run_streaming(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<UpdateStream, EngineError> {
        debug!(thread = %thread_id, assistant = %assistant_id, "starting streaming run");
        let body = json!({ "assistant_id": assistant_id, "stream": true });
        self.open_stream(&format!("/threads/{thread_id}/runs"), body)
            .await
    }

    async fn submit_tool_outputs_streaming(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<UpdateStream, EngineError> {
        debug!(thread = %thread_id, run = %run_id, outputs = outputs.len(), "submitting tool outputs");
        let tool_outputs: Vec<Value> = outputs
            .iter()
            .map(|o| json!({ "tool_call_id": o.tool_call_id, "output": o.payload }))
            .collect();
        let body = json!({ "tool_outputs": tool_outputs, "stream": true });
        self.open_stream(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            body,
        )
        .await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), EngineError> {
        self.send(self.request(
            Method::POST,
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
        ))
        .await?;
        debug!(thread = %thread_id, run = %run_id, "cancelled run");
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), EngineError> {
        self.send(self.request(Method::DELETE, &format!("/threads/{thread_id}")))
            .await?;
        debug!(thread = %thread_id, "deleted thread");
        Ok(())
    }

    async fn runs_usage(&self, thread_id: &str) -> Result<Vec<TokenUsage>, EngineError> {
        let path = format!("/threads/{thread_id}/runs");
        let path = path.as_str();
        let json = retry_read("runs_usage", self.config.max_read_retries, move || {
            self.send_json(
                self.request(Method::GET, path)
                    .query(&[("limit", "100"), ("order", "desc")]),
            )
        })
        .await?;

        Ok(json["data"]
            .as_array()
            .map(|runs| runs.iter().filter_map(|run| parse_usage(&run["usage"])).collect())
            .unwrap_or_default())
    }

    async fn modify_thread(
        &self,
        thread_id: &str,
        metadata: &HashMap<String, String>,
        vector_store_ids: &[String],
    ) -> Result<(), EngineError> {
        let mut body = json!({ "metadata": metadata });
        if !vector_store_ids.is_empty() {
            body["tool_resources"] = json!({
                "file_search": { "vector_store_ids": vector_store_ids }
            });
        }
        self.send(
            self.request(Method::POST, &format!("/threads/{thread_id}"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_vector_store(&self, file_ids: &[String]) -> Result<String, EngineError> {
        let json = self
            .send_json(
                self.request(Method::POST, "/vector_stores")
                    .json(&json!({ "file_ids": file_ids })),
            )
            .await?;
        json["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| EngineError::Parse("vector store response missing id".into()))
    }

    async fn add_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), EngineError> {
        self.send(
            self.request(
                Method::POST,
                &format!("/vector_stores/{vector_store_id}/files"),
            )
            .json(&json!({ "file_id": file_id })),
        )
        .await?;
        Ok(())
    }

    async fn remove_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<(), EngineError> {
        self.send(self.request(
            Method::DELETE,
            &format!("/vector_stores/{vector_store_id}/files/{file_id}"),
        ))
        .await?;
        Ok(())
    }

    async fn delete_vector_store(&self, vector_store_id: &str) -> Result<(), EngineError> {
        self.send(self.request(
            Method::DELETE,
            &format!("/vector_stores/{vector_store_id}"),
        ))
        .await?;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), EngineError> {
        self.send(self.request(Method::DELETE, &format!("/files/{file_id}")))
            .await?;
        Ok(())
    }
}
