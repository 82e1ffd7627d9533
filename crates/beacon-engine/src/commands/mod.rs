//! Command registry: the functions a paused run may ask us to execute.
//!
//! Each command decodes its raw JSON arguments, may read or write the
//! turn-scoped `MessageContext`, and returns a structured JSON result.
//! Registration happens once at startup; the registry is read-only after
//! that and shared behind an `Arc`.

mod assets;
mod definitions;
mod navigation;


use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::repository::AssetRepository;
use crate::timeseries::TimeSeriesStore;
use crate::ToolDefinition;

pub use assets::{GetTimeSeries, NavigateToAsset};
pub use navigation::{NavigateToPage, SearchProject, SearchSubscription};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid arguments for {command}: {reason}")]
    ArgumentDecode { command: String, reason: String },
    #[error("{0}")]
    Handler(String),
}

/// Values inferred earlier in the same turn, visible to later commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContext {
    pub subscription_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub asset_id: Option<Uuid>,
}

/// Application-visible outcome of one handled command.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Tool definition advertised to the assistant.
    fn definition(&self) -> ToolDefinition;

    async fn handle(
        &self,
        raw_args: &str,
        ctx: &mut MessageContext,
    ) -> Result<serde_json::Value, CommandError>;
}

#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in command.
    pub fn with_defaults(repo: Arc<dyn AssetRepository>, series: Arc<TimeSeriesStore>) -> Self {
        let mut registry = Self::new();
        registry.register(
            "NavigateToAsset",
            Arc::new(NavigateToAsset::new(repo.clone())),
        );
        registry.register(
            "GetTimeSeries",
            Arc::new(GetTimeSeries::new(repo.clone(), series)),
        );
        registry.register(
            "SearchSubscription",
            Arc::new(SearchSubscription::new(repo.clone())),
        );
        registry.register("SearchProject", Arc::new(SearchProject::new(repo)));
        registry.register("NavigateToPage", Arc::new(NavigateToPage));
        registry
    }

    /// Register a handler. A later registration under the same name wins.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CommandHandler>, CommandError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Tool definitions for every registered command, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.handlers.values().map(|h| h.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Decode tool-call arguments. Blank arguments decode as `{}`.
pub(crate) fn decode_args<T: DeserializeOwned>(command: &str, raw: &str) -> Result<T, CommandError> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| CommandError::ArgumentDecode {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn to_value(response: impl serde::Serialize) -> Result<serde_json::Value, CommandError> {
    serde_json::to_value(response).map_err(|e| CommandError::Handler(e.to_string()))
}

/// Parse an optional id argument, treating blanks as absent.
pub(crate) fn parse_optional_id(
    command: &str,
    field: &str,
    value: Option<&str>,
) -> Result<Option<Uuid>, CommandError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => Uuid::parse_str(v)
            .map(Some)
            .map_err(|e| CommandError::ArgumentDecode {
                command: command.to_string(),
                reason: format!("{field}: {e}"),
            }),
    }
}
