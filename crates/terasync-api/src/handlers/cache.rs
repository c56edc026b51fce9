//! Pull endpoint.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::Response;
use tracing::info;

use terasync_core::error::{AppError, ErrorKind};
use terasync_queue::prepare_pull;

use crate::dto::request::RequestIdQuery;
use crate::error::ApiError;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// GET /cache/get?requestId={id}
///
/// Streams every available blob of an Active request owned by the caller
/// as consecutive `#HASH:LENGTH#` frames.
pub async fn get_files(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RequestIdQuery>,
) -> Result<Response, ApiError> {
    let batch = prepare_pull(
        &state.queue,
        state.storage.provider(),
        &query.request_id,
        &user.uid,
    )
    .await?;

    let length = batch.content_length();
    info!(
        request_id = %query.request_id,
        uid = %user.uid,
        files = batch.blobs.len(),
        skipped = batch.skipped,
        bytes = length,
        "Serving pull"
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(batch.into_stream()))
        .map_err(|e| AppError::with_source(ErrorKind::Internal, "Failed to build response", e).into())
}
