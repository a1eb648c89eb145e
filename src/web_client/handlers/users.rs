//! User directory handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::web_client::auth::AuthUser;
use crate::web_client::state::SharedState;
use crate::web_client::utils::core_error;

/// GET /api/users - everyone the caller may chat with, minus blocked users
pub async fn list_users_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.messages.users_for_sidebar(&auth.user_id) {
        Ok(users) => (StatusCode::OK, axum::Json(users)).into_response(),
        Err(e) => core_error(e),
    }
}
