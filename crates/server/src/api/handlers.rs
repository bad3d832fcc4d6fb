use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use qbdeck_core::sync::{BatchError, Category};
use qbdeck_core::{EngineStatus, SanitizedConfig, SyncError};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<Category>,
    pub tags: Vec<String>,
}

/// Error half of every fallible handler.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Map an engine error onto an HTTP status.
pub fn sync_error(e: SyncError) -> ApiError {
    let status = match &e {
        SyncError::Batch(BatchError::Busy) => StatusCode::CONFLICT,
        SyncError::Batch(BatchError::EmptyTargets)
        | SyncError::EmptySelection
        | SyncError::UnknownCategory(_) => StatusCode::BAD_REQUEST,
        SyncError::UnknownTorrent(_) => StatusCode::NOT_FOUND,
        SyncError::Client(_) | SyncError::Reconcile(_) => StatusCode::BAD_GATEWAY,
        SyncError::BatchTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine().status().await)
}

/// POST /api/v1/refresh
///
/// Wake the poll loop. The new data arrives through the usual notifications.
pub async fn refresh(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine().request_refresh();
    StatusCode::ACCEPTED
}

/// GET /api/v1/categories
pub async fn list_categories(State(state): State<Arc<AppState>>) -> Json<CategoryListResponse> {
    let engine = state.engine();
    Json(CategoryListResponse {
        categories: engine.categories().await,
        tags: engine.tags().await,
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        encode_metrics(),
    )
}
