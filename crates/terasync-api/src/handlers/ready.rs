//! Inbound side of the ready-notification bridge.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use tracing::debug;

use terasync_core::error::AppError;
use terasync_core::types::Uid;

use crate::dto::request::SendReadyQuery;
use crate::error::ApiError;
use crate::extractors::ServiceCaller;
use crate::state::AppState;

/// GET /main/sendReady?uid={uid}&requestId={id}
///
/// Pushes `download_ready` to the owner if they are connected to this
/// shard or another one. An offline owner is not an error.
pub async fn send_ready(
    State(state): State<AppState>,
    caller: ServiceCaller,
    Query(query): Query<SendReadyQuery>,
) -> Result<StatusCode, ApiError> {
    let engine = state
        .realtime
        .as_ref()
        .ok_or_else(|| AppError::not_found("This process does not serve the hub"))?;
    let uid = Uid::parse(query.uid)?;

    debug!(%uid, request_id = %query.request_id, shard = %caller.shard, "Ready notification received");
    engine.send_download_ready(&uid, query.request_id).await;
    Ok(StatusCode::OK)
}
