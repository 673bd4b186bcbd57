use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use competeiq_pipeline::{IngestReport, RawArticle};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{json_body, map_pipeline_error, ApiError, ApiResponse, AppState};

/// Most articles accepted in one pushed batch.
const MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
pub(super) struct IngestRequest {
    source_id: String,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

pub(super) async fn ingest_batch(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<IngestReport>>, ApiError> {
    let request = json_body(&req_id.0, payload)?;

    let source_id = request.source_id.trim();
    if source_id.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "source_id must not be empty",
        ));
    }
    if request.articles.len() > MAX_BATCH_SIZE {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            format!("at most {MAX_BATCH_SIZE} articles per batch"),
        ));
    }

    let report = state
        .pipeline
        .ingest_batch(source_id, request.articles)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    tracing::info!(
        source = %source_id,
        processed = report.processed_count,
        duplicates = report.duplicate_count,
        failed = report.failed_count,
        alerts = report.alerts_generated,
        "batch ingested"
    );
    Ok(ApiResponse::new(report, req_id.0))
}
