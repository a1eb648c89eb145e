//! Session authentication for API routes.
//!
//! The session token is taken from, in order: an `Authorization: Bearer`
//! header, the `session` cookie, or a `token` query parameter. The query form
//! exists for WebSocket clients, which cannot set headers from a browser.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::config::SESSION_COOKIE;
use super::state::SharedState;
use super::utils::{api_error, core_error, now_secs};

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub token: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn non_empty(token: &str) -> Option<String> {
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Find the session token on a request, if any.
pub(crate) fn session_token(parts: &Parts) -> Option<String> {
    if let Some(token) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(non_empty)
    {
        return Some(token);
    }

    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(token) = jar.get(SESSION_COOKIE).and_then(|c| non_empty(c.value())) {
        return Some(token);
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .and_then(|t| non_empty(&t))
}

#[axum::async_trait]
impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts)
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "not authenticated"))?;
        let user_id = state
            .identity
            .authenticate(&token, now_secs())
            .map_err(core_error)?;
        Ok(AuthUser { user_id, token })
    }
}
