use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::web_client::state::SharedState;

/// GET /api/health
pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "online": state.presence.online_users().len(),
        "connections": state.presence.connection_count(),
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}
