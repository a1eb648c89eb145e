//! Direct message handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::messaging::OutgoingMessage;
use crate::web_client::auth::AuthUser;
use crate::web_client::state::SharedState;
use crate::web_client::utils::{core_error, now_secs};

/// GET /api/messages/:peer_id - the conversation between caller and peer, oldest first
pub async fn history_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(peer_id): Path<String>,
) -> Response {
    match state.messages.history(&auth.user_id, &peer_id) {
        Ok(messages) => (StatusCode::OK, axum::Json(messages)).into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/messages/send/:peer_id - text and/or an inline image
pub async fn send_message_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(peer_id): Path<String>,
    axum::Json(outgoing): axum::Json<OutgoingMessage>,
) -> Response {
    match state
        .messages
        .send(&auth.user_id, &peer_id, outgoing, now_secs())
        .await
    {
        Ok(message) => (StatusCode::CREATED, axum::Json(message)).into_response(),
        Err(e) => core_error(e),
    }
}
