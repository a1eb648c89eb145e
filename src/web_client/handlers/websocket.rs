//! WebSocket upgrade and connection handling.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::logging;
use crate::presence::ServerEvent;
use crate::web_client::auth::AuthUser;
use crate::web_client::config::MAX_WS_CONNECTIONS;
use crate::web_client::state::SharedState;
use crate::web_client::utils::{api_error, core_error};

/// GET /api/ws?token=... - the caller is online while this socket is open
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Response {
    // Check connection limit before upgrading
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "too many WebSocket connections (max {})",
                MAX_WS_CONNECTIONS
            ),
        );
    }

    let visible = match state.storage.require_user(&auth.user_id) {
        Ok(user) => user.privacy.show_online_status,
        Err(e) => return core_error(CoreError::from(e)),
    };

    ws.on_upgrade(move |socket| ws_connection(socket, state, auth.user_id, visible))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, user_id: String, visible: bool) {
    state.ws_connection_count.fetch_add(1, Ordering::Relaxed);

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = state.presence.register(&user_id, visible, tx);
    tracing::debug!("ws: {} connected ({connection_id})", logging::user_id(&user_id));

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(WsMessage::Text(json)).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Err(e) => tracing::warn!("ws: failed to encode event: {e}"),
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Text(text))) if text.trim() == "ping" => {
                        if socket.send(WsMessage::Text("pong".to_string())).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    state.presence.unregister(connection_id);
    state.ws_connection_count.fetch_sub(1, Ordering::Relaxed);
    tracing::debug!("ws: {} disconnected ({connection_id})", logging::user_id(&user_id));
}
