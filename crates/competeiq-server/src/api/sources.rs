use axum::{
    extract::{Path, State},
    Extension, Json,
};
use competeiq_core::{Competitor, Source};
use competeiq_pipeline::IngestReport;

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

pub(super) async fn list_sources(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<Source>>> {
    ApiResponse::new(state.pipeline.registry().list(), req_id.0)
}

/// Poll one source immediately, outside its schedule.
pub(super) async fn poll_source(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<IngestReport>>, ApiError> {
    let report = state
        .pipeline
        .poll_source(&id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(report, req_id.0))
}

pub(super) async fn list_competitors(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<Competitor>>> {
    ApiResponse::new(state.pipeline.competitors().to_vec(), req_id.0)
}
