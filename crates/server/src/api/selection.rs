use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::handlers::{sync_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub hashes: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub hash: String,
    pub selected: bool,
    pub count: usize,
}

async fn current(state: &AppState) -> SelectionResponse {
    let hashes: Vec<String> = state.engine().selection().await.to_vec();
    let count = hashes.len();
    SelectionResponse { hashes, count }
}

/// GET /api/v1/selection
pub async fn get_selection(State(state): State<Arc<AppState>>) -> Json<SelectionResponse> {
    Json(current(&state).await)
}

/// POST /api/v1/selection/toggle/{hash}
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let selected = state.engine().toggle(&hash).await.map_err(sync_error)?;
    let count = state.engine().status().await.selected;
    Ok(Json(ToggleResponse {
        hash,
        selected,
        count,
    }))
}

/// POST /api/v1/selection/all
///
/// Selects what the current view shows, not the whole store.
pub async fn select_all(State(state): State<Arc<AppState>>) -> Json<SelectionResponse> {
    state.engine().select_all_visible().await;
    Json(current(&state).await)
}

/// DELETE /api/v1/selection
pub async fn clear(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine().clear_selection().await;
    StatusCode::NO_CONTENT
}
