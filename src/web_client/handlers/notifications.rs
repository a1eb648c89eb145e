//! Notification ledger handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::web_client::auth::AuthUser;
use crate::web_client::state::SharedState;
use crate::web_client::utils::{api_error, core_error};

/// GET /api/notifications - oldest first
pub async fn list_notifications_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Response {
    match state.notifications.list(&auth.user_id) {
        Ok(notifications) => (StatusCode::OK, axum::Json(notifications)).into_response(),
        Err(e) => core_error(e),
    }
}

/// GET /api/notifications/count - unread count
pub async fn unread_count_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.notifications.unread_count(&auth.user_id) {
        Ok(count) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "count": count })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/notifications/read - mark every notification read
pub async fn mark_all_read_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.notifications.mark_all_read(&auth.user_id) {
        Ok(marked) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "marked": marked })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/notifications/:id/read
pub async fn mark_read_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Response {
    match state.notifications.mark_read(&auth.user_id, &id) {
        Ok(true) => (StatusCode::OK, axum::Json(serde_json::json!({ "id": id }))).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "notification not found"),
        Err(e) => core_error(e),
    }
}
