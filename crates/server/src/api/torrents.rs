//! Torrent list API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use qbdeck_core::{TorrentRecord, ViewWindow};
use serde::Deserialize;

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl WindowParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

/// GET /api/v1/torrents
///
/// One window of the derived view, in view order.
pub async fn list_torrents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowParams>,
) -> Json<ViewWindow> {
    Json(state.engine().window(params.offset, params.limit()).await)
}

/// GET /api/v1/torrents/{hash}
pub async fn get_torrent(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<TorrentRecord>, ApiError> {
    match state.engine().torrent(&hash).await {
        Some(record) => Ok(Json(record.as_ref().clone())),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Torrent not found: {}", hash),
        )),
    }
}
