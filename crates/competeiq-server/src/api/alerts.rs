use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use competeiq_core::Alert;
use competeiq_pipeline::{AlertFilter, RuleStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct AlertsQuery {
    pub rule_id: Option<String>,
    pub competitor_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Alerts in creation order, keeping the most recent `limit`.
pub(super) async fn list_alerts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AlertsQuery>,
) -> Json<ApiResponse<Vec<Alert>>> {
    let filter = AlertFilter {
        rule_id: query.rule_id,
        competitor_id: query.competitor_id,
        since: query.since,
        limit: Some(normalize_limit(query.limit)),
    };
    ApiResponse::new(state.pipeline.alert_log().list(&filter), req_id.0)
}

pub(super) async fn get_alert(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Alert>>, ApiError> {
    match state.pipeline.alert_log().get(id) {
        Some(alert) => Ok(ApiResponse::new(alert, req_id.0)),
        None => Err(ApiError::new(req_id.0, "not_found", "alert not found")),
    }
}

pub(super) async fn list_rule_statuses(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<RuleStatus>>> {
    ApiResponse::new(state.pipeline.rule_statuses(), req_id.0)
}
