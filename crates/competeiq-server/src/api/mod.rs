mod alerts;
mod documents;
mod ingest;
mod search;
mod sources;
mod trends;


use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use competeiq_pipeline::{Pipeline, PipelineError, PipelineStats};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    #[serde(flatten)]
    stats: PipelineStats,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" | "unknown_source" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(50).clamp(1, 200)
}

/// Map a pipeline error onto the stable API error codes.
pub(super) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::InvalidRequest(reason) => {
            ApiError::new(request_id, "validation_error", reason.clone())
        }
        PipelineError::SourceDisabled(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        PipelineError::UnknownSource(_) => {
            ApiError::new(request_id, "unknown_source", error.to_string())
        }
        PipelineError::Http(_)
        | PipelineError::SourceFetch { .. }
        | PipelineError::EnrichmentTimeout { .. }
        | PipelineError::Enrichment { .. }
        | PipelineError::IndexWrite { .. }
        | PipelineError::Qdrant(_)
        | PipelineError::Tei(_) => {
            tracing::warn!(error = %error, "upstream dependency unavailable");
            ApiError::new(request_id, "upstream_unavailable", error.to_string())
        }
        PipelineError::Xml(_)
        | PipelineError::DimensionMismatch { .. }
        | PipelineError::RuleEvaluation { .. }
        | PipelineError::CycleAborted { .. } => {
            tracing::error!(error = %error, "pipeline request failed");
            ApiError::new(request_id, "internal_error", "pipeline request failed")
        }
    }
}

/// Unwrap a JSON body, turning extractor rejections into `validation_error`.
pub(super) fn json_body<T>(
    request_id: &str,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::new(request_id, "validation_error", rejection.body_text()))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/ingest", post(ingest::ingest_batch))
        .route("/api/v1/search", post(search::search))
        .route("/api/v1/documents", get(documents::list_documents))
        .route("/api/v1/documents/{id}", get(documents::get_document))
        .route("/api/v1/alerts", get(alerts::list_alerts))
        .route("/api/v1/alerts/{id}", get(alerts::get_alert))
        .route("/api/v1/rules", get(alerts::list_rule_statuses))
        .route("/api/v1/trends/windows", get(trends::list_windows))
        .route("/api/v1/trends/summary", get(trends::trend_summary))
        .route("/api/v1/sources", get(sources::list_sources))
        .route("/api/v1/sources/{id}/poll", post(sources::poll_source))
        .route("/api/v1/competitors", get(sources::list_competitors))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.pipeline.stats().await {
        Ok(stats) => {
            let status = if stats.sources_degraded > 0 {
                "degraded"
            } else {
                "ok"
            };
            (
                StatusCode::OK,
                Json(ApiResponse {
                    data: HealthData { status, stats },
                    meta,
                }),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "health check: document store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "unavailable",
                        stats: PipelineStats::default(),
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}
