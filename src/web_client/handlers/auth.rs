//! Account handlers: signup, login, logout, session check and profile picture.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::web_client::auth::AuthUser;
use crate::web_client::config::SESSION_COOKIE;
use crate::web_client::state::SharedState;
use crate::web_client::utils::{api_error, core_error, now_secs, ok_message};

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default, alias = "fullName")]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, alias = "profilePic")]
    pub profile_pic: String,
}

/// POST /api/auth/signup - create an unverified account and mail a code
pub async fn signup_handler(
    State(state): State<SharedState>,
    axum::Json(req): axum::Json<SignupRequest>,
) -> Response {
    // Password hashing is CPU-bound.
    let result = tokio::task::spawn_blocking(move || {
        state
            .identity
            .signup(&req.full_name, &req.email, &req.password, now_secs())
    })
    .await;

    match result {
        Ok(Ok(user)) => (
            StatusCode::CREATED,
            axum::Json(serde_json::json!({
                "message": "verification code sent",
                "user": user,
            })),
        )
            .into_response(),
        Ok(Err(e)) => core_error(e),
        Err(e) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal error: {e}"),
        ),
    }
}

/// POST /api/auth/login - start a session; the token is returned and set as a cookie
pub async fn login_handler(
    State(state): State<SharedState>,
    jar: CookieJar,
    axum::Json(req): axum::Json<LoginRequest>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        state.identity.login(&req.email, &req.password, now_secs())
    })
    .await;

    match result {
        Ok(Ok(outcome)) => {
            let cookie = Cookie::build((SESSION_COOKIE, outcome.token.clone()))
                .http_only(true)
                .same_site(SameSite::Strict)
                .path("/");
            (jar.add(cookie), axum::Json(outcome)).into_response()
        }
        Ok(Err(e)) => core_error(e),
        Err(e) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("internal error: {e}"),
        ),
    }
}

/// POST /api/auth/logout
pub async fn logout_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    jar: CookieJar,
) -> Response {
    match state.identity.logout(&auth.token) {
        Ok(_) => {
            let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
            (jar, ok_message("logged out")).into_response()
        }
        Err(e) => core_error(e),
    }
}

/// GET /api/auth/check - the caller's public profile
pub async fn check_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.identity.check_auth(&auth.user_id) {
        Ok(user) => (StatusCode::OK, axum::Json(user)).into_response(),
        Err(e) => core_error(e),
    }
}

/// PUT /api/auth/update-profile - replace the profile picture
pub async fn update_profile_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<UpdateProfileRequest>,
) -> Response {
    match state
        .identity
        .update_profile_pic(&auth.user_id, &req.profile_pic)
        .await
    {
        Ok(user) => (StatusCode::OK, axum::Json(user)).into_response(),
        Err(e) => core_error(e),
    }
}
