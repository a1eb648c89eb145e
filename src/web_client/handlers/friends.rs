//! Friendship handlers: requests, removal, blocking, lists and per-friend metadata.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::model::PrivacyUpdate;
use crate::relationships::DEFAULT_SUGGESTION_LIMIT;
use crate::web_client::auth::AuthUser;
use crate::web_client::state::SharedState;
use crate::web_client::utils::{core_error, now_secs, ok_message};

/// Body naming the other user of a transition.
#[derive(Deserialize)]
pub struct TargetRequest {
    #[serde(
        alias = "userId",
        alias = "requesterId",
        alias = "friendId",
        alias = "unblockUserId"
    )]
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct RequestWithNote {
    #[serde(alias = "userId", alias = "receiverId")]
    pub user_id: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct BlockRequest {
    #[serde(alias = "userId", alias = "blockUserId")]
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct NicknameRequest {
    #[serde(alias = "friendId")]
    pub user_id: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Deserialize)]
pub struct BadgeRequest {
    #[serde(alias = "friendId")]
    pub user_id: String,
    pub badge: String,
}

#[derive(Deserialize)]
pub struct MutualQuery {
    #[serde(alias = "userId")]
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct SuggestionQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// POST /api/friends/request
pub async fn send_request_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<RequestWithNote>,
) -> Response {
    send_request(&state, &auth, req)
}

/// POST /api/friends/request-note - same as a plain request, with a note attached
pub async fn send_request_with_note_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<RequestWithNote>,
) -> Response {
    send_request(&state, &auth, req)
}

fn send_request(state: &SharedState, auth: &AuthUser, req: RequestWithNote) -> Response {
    match state.relationships.send_request(
        &auth.user_id,
        &req.user_id,
        req.note.as_deref(),
        now_secs(),
    ) {
        Ok(()) => ok_message("friend request sent"),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/cancel
pub async fn cancel_request_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<TargetRequest>,
) -> Response {
    match state.relationships.cancel_request(&auth.user_id, &req.user_id) {
        Ok(cancelled) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "cancelled": cancelled })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/accept
pub async fn accept_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<TargetRequest>,
) -> Response {
    match state
        .relationships
        .accept(&auth.user_id, &req.user_id, now_secs())
    {
        Ok(()) => ok_message("friend request accepted"),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/reject
pub async fn reject_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<TargetRequest>,
) -> Response {
    match state.relationships.reject(&auth.user_id, &req.user_id) {
        Ok(()) => ok_message("friend request rejected"),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/remove
pub async fn remove_friend_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<TargetRequest>,
) -> Response {
    match state.relationships.remove_friend(&auth.user_id, &req.user_id) {
        Ok(removed) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "removed": removed })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

/// POST /api/block
pub async fn block_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<BlockRequest>,
) -> Response {
    match state.relationships.block(
        &auth.user_id,
        &req.user_id,
        req.reason.as_deref(),
        now_secs(),
    ) {
        Ok(()) => ok_message("user blocked"),
        Err(e) => core_error(e),
    }
}

/// POST /api/unblock
pub async fn unblock_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<TargetRequest>,
) -> Response {
    match state.relationships.unblock(&auth.user_id, &req.user_id) {
        Ok(unblocked) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "unblocked": unblocked })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

/// GET /api/blocked
pub async fn list_blocked_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.relationships.list_blocked(&auth.user_id) {
        Ok(blocked) => (StatusCode::OK, axum::Json(blocked)).into_response(),
        Err(e) => core_error(e),
    }
}

// ---------------------------------------------------------------------------
// Lists and queries
// ---------------------------------------------------------------------------

/// GET /api/friends
pub async fn list_friends_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.relationships.list_friends(&auth.user_id) {
        Ok(friends) => (StatusCode::OK, axum::Json(friends)).into_response(),
        Err(e) => core_error(e),
    }
}

/// GET /api/friends/requests - pending incoming requests
pub async fn list_requests_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.relationships.list_requests(&auth.user_id) {
        Ok(requests) => (StatusCode::OK, axum::Json(requests)).into_response(),
        Err(e) => core_error(e),
    }
}

/// GET /api/friends/mutual?user_id=...
pub async fn mutual_friends_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<MutualQuery>,
) -> Response {
    match state
        .relationships
        .mutual_friends(&auth.user_id, &query.user_id)
    {
        Ok(mutual) => (StatusCode::OK, axum::Json(mutual)).into_response(),
        Err(e) => core_error(e),
    }
}

/// GET /api/friends/suggestions?limit=N
pub async fn suggestions_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<SuggestionQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT);
    match state.relationships.suggestions(&auth.user_id, limit) {
        Ok(suggestions) => (StatusCode::OK, axum::Json(suggestions)).into_response(),
        Err(e) => core_error(e),
    }
}

/// GET /api/friends/status/:user_id - pair state as seen by the caller
pub async fn status_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Response {
    match state.relationships.relationship(&auth.user_id, &user_id) {
        Ok(pair) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "user_id": user_id,
                "status": pair.as_str(),
            })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}

// ---------------------------------------------------------------------------
// Friend metadata and privacy
// ---------------------------------------------------------------------------

/// POST /api/friends/nickname - a blank or missing nickname clears it
pub async fn nickname_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<NicknameRequest>,
) -> Response {
    match state
        .relationships
        .set_nickname(&auth.user_id, &req.user_id, req.nickname.as_deref())
    {
        Ok(entry) => (StatusCode::OK, axum::Json(entry)).into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/badge
pub async fn badge_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<BadgeRequest>,
) -> Response {
    match state
        .relationships
        .add_badge(&auth.user_id, &req.user_id, &req.badge)
    {
        Ok(entry) => (StatusCode::OK, axum::Json(entry)).into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/privacy - partial update, returns the full settings
pub async fn privacy_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(update): axum::Json<PrivacyUpdate>,
) -> Response {
    match state.relationships.set_privacy(&auth.user_id, update) {
        Ok(privacy) => (StatusCode::OK, axum::Json(privacy)).into_response(),
        Err(e) => core_error(e),
    }
}
