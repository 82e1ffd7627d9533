//! Asset navigation and time-series commands.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::{Asset, AssetRepository};
use crate::timeseries::TimeSeriesStore;
use crate::ToolDefinition;

use super::{decode_args, definitions, to_value, CommandError, CommandHandler, MessageContext};

const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Look an asset up by id, falling back to a name match when the id is
/// not a UUID, then by name.
async fn find_asset(
    repo: &dyn AssetRepository,
    asset_id: Option<&str>,
    asset_name: Option<&str>,
) -> Option<Asset> {
    if let Some(id) = asset_id.map(str::trim).filter(|s| !s.is_empty()) {
        return match Uuid::parse_str(id) {
            Ok(uuid) => repo.asset_by_id(uuid).await,
            Err(_) => repo.asset_by_name(id).await,
        };
    }
    match asset_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => repo.asset_by_name(name).await,
        None => None,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateToAssetArgs {
    asset_id: Option<String>,
    asset_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NavigateToAssetResponse {
    asset_id: Option<Uuid>,
    found: bool,
}

pub struct NavigateToAsset {
    repo: Arc<dyn AssetRepository>,
}

impl NavigateToAsset {
    pub fn new(repo: Arc<dyn AssetRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CommandHandler for NavigateToAsset {
    fn definition(&self) -> ToolDefinition {
        definitions::navigate_to_asset()
    }

    async fn handle(
        &self,
        raw_args: &str,
        ctx: &mut MessageContext,
    ) -> Result<serde_json::Value, CommandError> {
        let args: NavigateToAssetArgs = decode_args("NavigateToAsset", raw_args)?;
        let asset = find_asset(
            self.repo.as_ref(),
            args.asset_id.as_deref(),
            args.asset_name.as_deref(),
        )
        .await;

        if let Some(asset) = &asset {
            ctx.asset_id = Some(asset.id);
        }
        to_value(NavigateToAssetResponse {
            asset_id: asset.as_ref().map(|a| a.id),
            found: asset.is_some(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTimeSeriesArgs {
    asset_id: Option<String>,
    asset_name: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetTimeSeriesResponse {
    asset_id: Option<Uuid>,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

pub struct GetTimeSeries {
    repo: Arc<dyn AssetRepository>,
    series: Arc<TimeSeriesStore>,
}

impl GetTimeSeries {
    pub fn new(repo: Arc<dyn AssetRepository>, series: Arc<TimeSeriesStore>) -> Self {
        Self { repo, series }
    }
}

#[async_trait]
impl CommandHandler for GetTimeSeries {
    fn definition(&self) -> ToolDefinition {
        definitions::get_time_series()
    }

    async fn handle(
        &self,
        raw_args: &str,
        ctx: &mut MessageContext,
    ) -> Result<serde_json::Value, CommandError> {
        let args: GetTimeSeriesArgs = decode_args("GetTimeSeries", raw_args)?;
        let from = parse_time("from", args.from.as_deref())?;
        let to = parse_time("to", args.to.as_deref())?;

        let asset = find_asset(
            self.repo.as_ref(),
            args.asset_id.as_deref(),
            args.asset_name.as_deref(),
        )
        .await;
        let Some(asset) = asset else {
            return to_value(GetTimeSeriesResponse {
                asset_id: None,
                found: false,
                content: None,
            });
        };

        ctx.asset_id = Some(asset.id);
        let now = Utc::now();
        let to = to.unwrap_or(now);
        let from = from.unwrap_or(now - chrono::Duration::days(DEFAULT_WINDOW_DAYS));

        to_value(GetTimeSeriesResponse {
            asset_id: Some(asset.id),
            found: true,
            content: Some(self.series.csv(from, to)),
        })
    }
}

/// Accepts `yyyy-MM-dd HH:mm:ss`, ISO 8601 with or without offset, or a
/// bare date. Times without an offset are UTC.
fn parse_time(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, CommandError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(midnight.and_utc()));
    }

    Err(CommandError::ArgumentDecode {
        command: "GetTimeSeries".into(),
        reason: format!("{field}: unrecognized time {value:?}"),
    })
}
