//! Subscription/project search and page navigation commands.
//!
//! Searches record what they resolve in the `MessageContext`, so a later
//! `SearchProject` or `NavigateToPage` in the same turn can omit the ids.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::AssetRepository;
use crate::ToolDefinition;

use super::{
    decode_args, definitions, parse_optional_id, to_value, CommandError, CommandHandler,
    MessageContext,
};

#[derive(Debug, Deserialize)]
struct SearchSubscriptionArgs {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchSubscriptionResponse {
    subscription_id: Option<Uuid>,
    found: bool,
}

pub struct SearchSubscription {
    repo: Arc<dyn AssetRepository>,
}

impl SearchSubscription {
    pub fn new(repo: Arc<dyn AssetRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CommandHandler for SearchSubscription {
    fn definition(&self) -> ToolDefinition {
        definitions::search_subscription()
    }

    async fn handle(
        &self,
        raw_args: &str,
        ctx: &mut MessageContext,
    ) -> Result<serde_json::Value, CommandError> {
        let args: SearchSubscriptionArgs = decode_args("SearchSubscription", raw_args)?;
        let subscription = self.repo.subscription_by_name(&args.name).await;

        if let Some(subscription) = &subscription {
            ctx.subscription_id = Some(subscription.id);
        }
        to_value(SearchSubscriptionResponse {
            subscription_id: subscription.as_ref().map(|s| s.id),
            found: subscription.is_some(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchProjectArgs {
    name: String,
    subscription_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchProjectResponse {
    project_id: Option<Uuid>,
    subscription_id: Option<Uuid>,
    found: bool,
}

pub struct SearchProject {
    repo: Arc<dyn AssetRepository>,
}

impl SearchProject {
    pub fn new(repo: Arc<dyn AssetRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CommandHandler for SearchProject {
    fn definition(&self) -> ToolDefinition {
        definitions::search_project()
    }

    async fn handle(
        &self,
        raw_args: &str,
        ctx: &mut MessageContext,
    ) -> Result<serde_json::Value, CommandError> {
        let args: SearchProjectArgs = decode_args("SearchProject", raw_args)?;
        let subscription_id = parse_optional_id(
            "SearchProject",
            "subscriptionId",
            args.subscription_id.as_deref(),
        )?
        .or(ctx.subscription_id);

        let project = self.repo.project_by_name(&args.name, subscription_id).await;
        match project {
            Some(project) => {
                ctx.project_id = Some(project.id);
                ctx.subscription_id = Some(project.subscription_id);
                to_value(SearchProjectResponse {
                    project_id: Some(project.id),
                    subscription_id: Some(project.subscription_id),
                    found: true,
                })
            }
            None => to_value(SearchProjectResponse {
                project_id: None,
                subscription_id,
                found: false,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateToPageArgs {
    subscription_id: Option<String>,
    project_id: Option<String>,
    application: Option<String>,
    page: Option<String>,
    params: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum PageStatus {
    Success,
    MissingParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NavigateToPageResponse {
    status: PageStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    for_params: Vec<&'static str>,
    subscription_id: Option<Uuid>,
    project_id: Option<Uuid>,
    application: Option<String>,
    page: Option<String>,
    params: Option<BTreeMap<String, String>>,
}

/// Builds a navigation target from explicit arguments and the turn context.
pub struct NavigateToPage;

#[async_trait]
impl CommandHandler for NavigateToPage {
    fn definition(&self) -> ToolDefinition {
        definitions::navigate_to_page()
    }

    async fn handle(
        &self,
        raw_args: &str,
        ctx: &mut MessageContext,
    ) -> Result<serde_json::Value, CommandError> {
        const COMMAND: &str = "NavigateToPage";
        let args: NavigateToPageArgs = decode_args(COMMAND, raw_args)?;

        let subscription_id =
            parse_optional_id(COMMAND, "subscriptionId", args.subscription_id.as_deref())?
                .or(ctx.subscription_id);
        let project_id = parse_optional_id(COMMAND, "projectId", args.project_id.as_deref())?
            .or(ctx.project_id);
        let application = non_blank(args.application);
        let page = non_blank(args.page);

        let mut missing = Vec::new();
        if subscription_id.is_none() {
            missing.push("subscriptionId");
        }
        if project_id.is_none() {
            missing.push("projectId");
        }
        if application.is_none() {
            missing.push("application");
        }
        if page.is_none() {
            missing.push("page");
        }

        to_value(NavigateToPageResponse {
            status: if missing.is_empty() {
                PageStatus::Success
            } else {
                PageStatus::MissingParams
            },
            for_params: missing,
            subscription_id,
            project_id,
            application,
            page,
            params: non_blank(args.params).map(|raw| parse_params(&raw)),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `a=1&b=two%20words` (leading `?` optional) into a sorted map.
fn parse_params(raw: &str) -> BTreeMap<String, String> {
    let query = raw.trim_start_matches('?');
    match reqwest::Url::parse(&format!("http://localhost/?{query}")) {
        Ok(url) => url
            .query_pairs()
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect(),
        Err(_) => BTreeMap::new(),
    }
}
