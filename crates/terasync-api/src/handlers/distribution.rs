//! Service-to-service blob endpoint.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::Response;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use terasync_core::error::{AppError, ErrorKind};
use terasync_core::types::ContentHash;

use crate::dto::request::FileQuery;
use crate::error::ApiError;
use crate::extractors::ServiceCaller;
use crate::state::AppState;

/// GET /distribution/get?file={hash}
pub async fn get_file(
    State(state): State<AppState>,
    caller: ServiceCaller,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let hash = ContentHash::parse(&query.file)?;
    let blob = state.storage.provider().ensure(&hash).await?;
    debug!(%hash, shard = %caller.shard, bytes = blob.size_bytes, "Serving blob to shard");

    let file = tokio::fs::File::open(&blob.path).await.map_err(AppError::from)?;
    let body = Body::from_stream(ReaderStream::new(file.take(blob.size_bytes)));

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, blob.size_bytes)
        .body(body)
        .map_err(|e| AppError::with_source(ErrorKind::Internal, "Failed to build response", e).into())
}
