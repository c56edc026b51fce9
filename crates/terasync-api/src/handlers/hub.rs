//! Hub WebSocket upgrade and socket loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time;
use tracing::{debug, info, warn};

use terasync_core::error::AppError;
use terasync_realtime::message::OutboundMessage;
use terasync_realtime::{ConnectionHandle, RealtimeEngine};

use crate::dto::request::HubQuery;
use crate::error::ApiError;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// GET /hub: WebSocket upgrade.
///
/// The token comes from the `Authorization` header or, failing that, the
/// `token` query parameter. Authentication happens before the upgrade.
pub async fn hub_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<HubQuery>,
    header_user: Result<AuthUser, ApiError>,
) -> Result<Response, ApiError> {
    let engine = state
        .realtime
        .clone()
        .ok_or_else(|| AppError::not_found("This process does not serve the hub"))?;

    let user = match header_user {
        Ok(user) => user,
        Err(header_err) => match query.token.as_deref() {
            Some(token) => AuthUser::from_token(&state, token)?,
            None => return Err(header_err),
        },
    };

    Ok(ws.on_upgrade(move |socket| run_connection(state, engine, user, socket)))
}

type Sink = SplitSink<WebSocket, Message>;

/// Drive one hub connection until either side closes it.
async fn run_connection(state: AppState, engine: RealtimeEngine, user: AuthUser, socket: WebSocket) {
    let (handle, mut outbound) = engine.connect(user.user_data()).await;
    let (mut sink, mut stream) = socket.split();

    let ping_every = Duration::from_secs(state.config.realtime.ping_interval_seconds.max(1));
    let mut ping = time::interval_at(time::Instant::now() + ping_every, ping_every);

    loop {
        tokio::select! {
            _ = handle.closed() => {
                flush_pending(&mut sink, &mut outbound).await;
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if !send_message(&mut sink, &msg).await {
                        break;
                    }
                }
                None => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // Stops reading while the connection is at its call limit.
                    engine.admit_call(&handle, text.as_str().to_owned()).await;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => handle.touch().await,
                Some(Ok(Message::Binary(_))) => {
                    handle.send(OutboundMessage::error("Binary frames are not supported"));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(conn = %handle.id, error = %e, "Socket error");
                    break;
                }
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    close_session(&state, &engine, &handle).await;
}

async fn send_message(sink: &mut Sink, msg: &OutboundMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound message");
            true
        }
    }
}

/// Send whatever was queued before the server closed the connection.
async fn flush_pending(
    sink: &mut Sink,
    outbound: &mut tokio::sync::mpsc::Receiver<OutboundMessage>,
) {
    while let Ok(msg) = outbound.try_recv() {
        if !send_message(sink, &msg).await {
            return;
        }
    }
}

/// Tear the connection down and, when the identity went offline, drop its
/// download requests. The sweeper may already have run the disconnect.
async fn close_session(state: &AppState, engine: &RealtimeEngine, handle: &Arc<ConnectionHandle>) {
    engine.disconnect(handle).await;
    if handle.session_ended() {
        let dropped = state.queue.cancel_all_of(handle.uid());
        if dropped > 0 {
            info!(uid = %handle.uid(), dropped, "Cancelled download requests of departed user");
        }
    }
}
