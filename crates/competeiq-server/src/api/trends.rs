use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use competeiq_core::{TrendSnapshot, TrendWindow};
use competeiq_pipeline::WindowFilter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{normalize_limit, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct WindowsQuery {
    pub competitor_id: Option<String>,
    #[serde(default)]
    pub finalized_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct TrendWindowItem {
    competitor_id: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    mention_count: u64,
    sentiment_avg: f64,
    finalized: bool,
    document_ids: Vec<Uuid>,
}

impl From<TrendWindow> for TrendWindowItem {
    fn from(window: TrendWindow) -> Self {
        Self {
            sentiment_avg: window.sentiment_avg(),
            window_end: window.key.window_end(),
            competitor_id: window.key.competitor_id,
            window_start: window.key.window_start,
            mention_count: window.mention_count,
            finalized: window.finalized,
            document_ids: window.document_ids,
        }
    }
}

/// Windows oldest first; `limit` keeps the most recent ones.
pub(super) async fn list_windows(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<WindowsQuery>,
) -> Json<ApiResponse<Vec<TrendWindowItem>>> {
    let filter = WindowFilter {
        competitor_id: query.competitor_id,
        finalized_only: query.finalized_only,
        since: query.since,
    };
    let mut windows = state.pipeline.aggregator().windows(&filter);
    let limit = normalize_limit(query.limit);
    if windows.len() > limit {
        windows.drain(..windows.len() - limit);
    }
    ApiResponse::new(
        windows.into_iter().map(TrendWindowItem::from).collect(),
        req_id.0,
    )
}

pub(super) async fn trend_summary(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<TrendSnapshot>>> {
    ApiResponse::new(state.pipeline.trend_summary(), req_id.0)
}
