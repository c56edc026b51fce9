//! Download request lifecycle: enqueue, check, cancel.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use tracing::debug;

use terasync_core::error::AppError;
use terasync_core::types::RequestId;

use crate::dto::request::{RequestIdQuery, parse_hashes};
use crate::dto::response::RequestStateResponse;
use crate::error::ApiError;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// POST /request/enqueue
///
/// Body: JSON array of hashes. Returns the new request id and starts
/// warming the cache for every hash.
pub async fn enqueue(
    State(state): State<AppState>,
    user: AuthUser,
    Json(files): Json<Vec<String>>,
) -> Result<Json<RequestId>, ApiError> {
    let hashes = parse_hashes(&files)?;
    if hashes.is_empty() {
        return Err(AppError::validation("At least one file is required").into());
    }

    state.storage.provider().prewarm(&hashes);

    let request_id = RequestId::new();
    state
        .queue
        .enqueue(request_id, &user.uid, hashes, user.priority)?;
    debug!(%request_id, uid = %user.uid, priority = user.priority, files = files.len(), "Enqueued");
    Ok(Json(request_id))
}

/// GET /request/check?requestId={id}
///
/// An optional JSON array of hashes in the body re-enqueues a request that
/// fell out of the queue, under the same id.
pub async fn check(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RequestIdQuery>,
    body: Bytes,
) -> Result<Json<RequestStateResponse>, ApiError> {
    let hashes = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let files: Vec<String> = serde_json::from_slice(&body)
            .map_err(|e| AppError::validation(format!("Invalid file list: {e}")))?;
        Some(parse_hashes(&files)?)
    };

    let current = state
        .queue
        .check(query.request_id, &user.uid, hashes, user.priority)?;
    Ok(Json(RequestStateResponse { state: current }))
}

/// GET /request/cancel?requestId={id}
pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RequestIdQuery>,
) -> Result<Json<RequestStateResponse>, ApiError> {
    let previous = state.queue.cancel(&query.request_id, &user.uid)?;
    Ok(Json(RequestStateResponse { state: previous }))
}
