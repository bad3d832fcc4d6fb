//! View definition handlers (filter and sort).

use std::sync::Arc;

use axum::{extract::State, Json};
use qbdeck_core::ViewSpec;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub spec: ViewSpec,
    pub visible: usize,
}

/// GET /api/v1/view
pub async fn get_view(State(state): State<Arc<AppState>>) -> Json<ViewResponse> {
    let engine = state.engine();
    let spec = engine.view_spec().await;
    let visible = engine.status().await.visible;
    Json(ViewResponse { spec, visible })
}

/// PUT /api/v1/view
///
/// Replaces the filter and sort. Selected torrents that are no longer visible
/// are deselected.
pub async fn set_view(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<ViewSpec>,
) -> Json<ViewResponse> {
    let visible = state.engine().set_view(spec.clone()).await;
    Json(ViewResponse { spec, visible })
}
