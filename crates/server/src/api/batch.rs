//! Batch action handlers.
//!
//! Every batch runs over the current selection. The response carries the
//! [`BatchResult`]; a batch where every target failed answers 502 with the
//! same body so the UI can still show per-hash reasons.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qbdeck_core::sync::BatchOperation;
use qbdeck_core::{BatchAction, BatchResult, BatchStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::handlers::{error_response, sync_error};
use crate::state::AppState;

/// What to do with downloaded data when deleting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteFiles {
    Keep,
    Remove,
    /// Use `sync.delete_files_by_default`.
    #[default]
    Default,
}

impl DeleteFiles {
    pub fn resolve(self, by_default: bool) -> bool {
        match self {
            DeleteFiles::Keep => false,
            DeleteFiles::Remove => true,
            DeleteFiles::Default => by_default,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub files: DeleteFiles,
}

#[derive(Debug, Deserialize)]
pub struct SetCategoryRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CurrentBatchResponse {
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<BatchOperation>,
}

async fn run_batch(state: &AppState, action: BatchAction) -> Response {
    match state.engine().execute_batch(action).await {
        Ok(result) => batch_response(result),
        Err(e) => sync_error(e).into_response(),
    }
}

fn batch_response(result: BatchResult) -> Response {
    let status = match result.status {
        BatchStatus::Failed => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };
    (status, Json(result)).into_response()
}

/// POST /api/v1/batch/pause
pub async fn pause(State(state): State<Arc<AppState>>) -> Response {
    run_batch(&state, BatchAction::Pause).await
}

/// POST /api/v1/batch/resume
pub async fn resume(State(state): State<Arc<AppState>>) -> Response {
    run_batch(&state, BatchAction::Resume).await
}

/// POST /api/v1/batch/delete
///
/// Refused unless `confirmed` is true.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeleteRequest>,
) -> Response {
    if !body.confirmed {
        return error_response(StatusCode::BAD_REQUEST, "Delete requires confirmation")
            .into_response();
    }
    let delete_files = body
        .files
        .resolve(state.config().sync.delete_files_by_default);
    info!(delete_files, "Confirmed batch delete");
    run_batch(&state, BatchAction::Delete { delete_files }).await
}

/// POST /api/v1/batch/category
pub async fn set_category(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetCategoryRequest>,
) -> Response {
    run_batch(&state, BatchAction::SetCategory { name: body.name }).await
}

/// GET /api/v1/batch
pub async fn current(State(state): State<Arc<AppState>>) -> Json<CurrentBatchResponse> {
    let operation = state.engine().current_batch();
    Json(CurrentBatchResponse {
        pending: operation.is_some(),
        operation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_files_resolution() {
        assert!(!DeleteFiles::Keep.resolve(true));
        assert!(DeleteFiles::Remove.resolve(false));
        assert!(DeleteFiles::Default.resolve(true));
        assert!(!DeleteFiles::Default.resolve(false));
    }

    #[test]
    fn test_delete_request_defaults_to_unconfirmed() {
        let body: DeleteRequest = serde_json::from_str("{}").unwrap();
        assert!(!body.confirmed);
        assert_eq!(body.files, DeleteFiles::Default);

        let body: DeleteRequest =
            serde_json::from_str(r#"{"confirmed": true, "files": "remove"}"#).unwrap();
        assert!(body.confirmed);
        assert_eq!(body.files, DeleteFiles::Remove);
    }
}
