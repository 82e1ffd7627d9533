//! OpenAI-compatible Assistants API client.
//!
//! Implements `AssistantApi` against the Assistants v2 REST surface,
//! either on api.openai.com (bearer auth) or an Azure OpenAI resource
//! (`api-key` header plus `api-version` query).

mod api;
mod client;
mod config;
mod events;

pub use client::OpenAiAssistantsClient;
pub use config::{AssistantsConfig, AuthMethod};
pub use events::translate_event;
