use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use competeiq_pipeline::{SearchRequest, SearchResponse};

use crate::middleware::RequestId;

use super::{json_body, map_pipeline_error, ApiError, ApiResponse, AppState};

pub(super) async fn search(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SearchResponse>>, ApiError> {
    let request = json_body(&req_id.0, payload)?;
    let response = state
        .pipeline
        .search(&request)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(response, req_id.0))
}
