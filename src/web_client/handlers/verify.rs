//! Email verification handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::web_client::state::SharedState;
use crate::web_client::utils::{core_error, now_secs, ok_message};

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Deserialize)]
pub struct ResendRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /api/verify-code
pub async fn verify_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<VerifyRequest>,
) -> Response {
    match state.identity.verify_code(&req.email, &req.code, now_secs()) {
        Ok(user) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "message": "email verified",
                "user": user,
            })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/verify-code/resend - issue a fresh code, replacing the old one
pub async fn resend_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<ResendRequest>,
) -> Response {
    match state.identity.resend_code(&req.email, now_secs()) {
        Ok(()) => ok_message("verification code sent"),
        Err(e) => core_error(e),
    }
}
