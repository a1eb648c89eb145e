//! Friend group handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::web_client::auth::AuthUser;
use crate::web_client::state::SharedState;
use crate::web_client::utils::{core_error, now_secs, ok_message};

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    #[serde(alias = "groupName")]
    pub name: String,
}

#[derive(Deserialize)]
pub struct MembershipRequest {
    #[serde(alias = "groupName")]
    pub name: String,
    #[serde(alias = "friendId", alias = "userId")]
    pub user_id: String,
}

/// GET /api/friends/groups
pub async fn list_groups_handler(State(state): State<SharedState>, auth: AuthUser) -> Response {
    match state.relationships.list_groups(&auth.user_id) {
        Ok(groups) => (StatusCode::OK, axum::Json(groups)).into_response(),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/groups
pub async fn create_group_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<CreateGroupRequest>,
) -> Response {
    match state
        .relationships
        .create_group(&auth.user_id, &req.name, now_secs())
    {
        Ok(group) => (StatusCode::CREATED, axum::Json(group)).into_response(),
        Err(e) => core_error(e),
    }
}

/// DELETE /api/friends/groups/:name
pub async fn delete_group_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(name): Path<String>,
) -> Response {
    match state.relationships.delete_group(&auth.user_id, &name) {
        Ok(()) => ok_message("group deleted"),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/group/add - members must be current friends
pub async fn add_member_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<MembershipRequest>,
) -> Response {
    match state
        .relationships
        .add_to_group(&auth.user_id, &req.name, &req.user_id)
    {
        Ok(()) => ok_message("added to group"),
        Err(e) => core_error(e),
    }
}

/// POST /api/friends/group/remove
pub async fn remove_member_handler(
    State(state): State<SharedState>,
    auth: AuthUser,
    axum::Json(req): axum::Json<MembershipRequest>,
) -> Response {
    match state
        .relationships
        .remove_from_group(&auth.user_id, &req.name, &req.user_id)
    {
        Ok(removed) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "removed": removed })),
        )
            .into_response(),
        Err(e) => core_error(e),
    }
}
