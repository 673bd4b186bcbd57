use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use competeiq_core::{Document, EnrichmentStatus, Sentiment};
use competeiq_pipeline::DocumentFilter;
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_pipeline_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct DocumentsQuery {
    pub source_id: Option<String>,
    pub competitor: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub status: Option<EnrichmentStatus>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

pub(super) async fn list_documents(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<DocumentsQuery>,
) -> Result<Json<ApiResponse<Vec<Document>>>, ApiError> {
    let filter = DocumentFilter {
        source_id: query.source_id,
        competitor: query.competitor,
        sentiment: query.sentiment,
        status: query.status,
        published_since: query.since,
        limit: Some(normalize_limit(query.limit)),
    };
    let data = state
        .pipeline
        .store()
        .list(&filter)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id.0))
}

pub(super) async fn get_document(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let doc = state
        .pipeline
        .store()
        .get(id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    match doc {
        Some(doc) => Ok(ApiResponse::new(doc, req_id.0)),
        None => Err(ApiError::new(req_id.0, "not_found", "document not found")),
    }
}
