//! JSON schemas for the built-in commands.

use serde_json::json;

use crate::ToolDefinition;

pub(crate) fn navigate_to_asset() -> ToolDefinition {
    ToolDefinition {
        name: "NavigateToAsset".into(),
        description: "Navigate to an asset".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "assetId": { "type": "string", "description": "The ID of the asset to navigate to" },
                "assetName": { "type": "string", "description": "The name of the asset to navigate to" }
            },
            "required": []
        }),
    }
}

pub(crate) fn get_time_series() -> ToolDefinition {
    ToolDefinition {
        name: "GetTimeSeries".into(),
        description: "Get time series data of given asset".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "assetId": { "type": "string", "description": "The ID of the asset" },
                "assetName": { "type": "string", "description": "The name of the asset" },
                "from": { "type": "string", "description": "From time (yyyy-MM-dd HH:mm:ss, UTC)" },
                "to": { "type": "string", "description": "To time (yyyy-MM-dd HH:mm:ss, UTC)" }
            },
            "required": []
        }),
    }
}

pub(crate) fn search_subscription() -> ToolDefinition {
    ToolDefinition {
        name: "SearchSubscription".into(),
        description: "Find a subscription by name".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The subscription name" }
            },
            "required": ["name"]
        }),
    }
}

pub(crate) fn search_project() -> ToolDefinition {
    ToolDefinition {
        name: "SearchProject".into(),
        description: "Find a project by name, optionally within a subscription".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The project name" },
                "subscriptionId": { "type": "string", "description": "The subscription the project belongs to" }
            },
            "required": ["name"]
        }),
    }
}

pub(crate) fn navigate_to_page() -> ToolDefinition {
    ToolDefinition {
        name: "NavigateToPage".into(),
        description: "Navigate to a page of an application within a project".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "subscriptionId": { "type": "string", "description": "The subscription ID" },
                "projectId": { "type": "string", "description": "The project ID" },
                "application": { "type": "string", "description": "The application name" },
                "page": { "type": "string", "description": "The page name" },
                "params": { "type": "string", "description": "Page parameters as a query string (a=1&b=2)" }
            },
            "required": []
        }),
    }
}
