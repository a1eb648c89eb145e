//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::web_client::config::MAX_IMAGE_BODY_BYTES;
use crate::web_client::handlers;
use crate::web_client::state::SharedState;

/// Build the complete Axum router with all API routes and upload serving.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health_handler))
        // Accounts
        .route("/api/auth/signup", post(handlers::auth::signup_handler))
        .route("/api/auth/login", post(handlers::auth::login_handler))
        .route("/api/auth/logout", post(handlers::auth::logout_handler))
        .route("/api/auth/check", get(handlers::auth::check_handler))
        .route(
            "/api/auth/update-profile",
            put(handlers::auth::update_profile_handler)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BODY_BYTES)),
        )
        .route("/api/verify-code", post(handlers::verify::verify_handler))
        .route(
            "/api/verify-code/resend",
            post(handlers::verify::resend_handler),
        )
        .route("/api/users", get(handlers::users::list_users_handler))
        // Friend requests
        .route(
            "/api/friends/request",
            post(handlers::friends::send_request_handler),
        )
        .route(
            "/api/friends/request-note",
            post(handlers::friends::send_request_with_note_handler),
        )
        .route(
            "/api/friends/cancel",
            post(handlers::friends::cancel_request_handler),
        )
        .route("/api/friends/accept", post(handlers::friends::accept_handler))
        .route("/api/friends/reject", post(handlers::friends::reject_handler))
        .route(
            "/api/friends/remove",
            post(handlers::friends::remove_friend_handler),
        )
        // Blocking
        .route("/api/block", post(handlers::friends::block_handler))
        .route("/api/unblock", post(handlers::friends::unblock_handler))
        .route("/api/blocked", get(handlers::friends::list_blocked_handler))
        // Friend lists and metadata
        .route("/api/friends", get(handlers::friends::list_friends_handler))
        .route(
            "/api/friends/requests",
            get(handlers::friends::list_requests_handler),
        )
        .route(
            "/api/friends/mutual",
            get(handlers::friends::mutual_friends_handler),
        )
        .route(
            "/api/friends/suggestions",
            get(handlers::friends::suggestions_handler),
        )
        .route(
            "/api/friends/status/:user_id",
            get(handlers::friends::status_handler),
        )
        .route(
            "/api/friends/nickname",
            post(handlers::friends::nickname_handler),
        )
        .route("/api/friends/badge", post(handlers::friends::badge_handler))
        .route(
            "/api/friends/privacy",
            post(handlers::friends::privacy_handler),
        )
        // Groups
        .route(
            "/api/friends/groups",
            get(handlers::groups::list_groups_handler).post(handlers::groups::create_group_handler),
        )
        .route(
            "/api/friends/groups/:name",
            delete(handlers::groups::delete_group_handler),
        )
        .route(
            "/api/friends/group/add",
            post(handlers::groups::add_member_handler),
        )
        .route(
            "/api/friends/group/remove",
            post(handlers::groups::remove_member_handler),
        )
        // Notifications
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications_handler),
        )
        .route(
            "/api/notifications/count",
            get(handlers::notifications::unread_count_handler),
        )
        .route(
            "/api/notifications/read",
            post(handlers::notifications::mark_all_read_handler),
        )
        .route(
            "/api/notifications/:id/read",
            post(handlers::notifications::mark_read_handler),
        )
        // Messages
        .route(
            "/api/messages/:peer_id",
            get(handlers::messages::history_handler),
        )
        .route(
            "/api/messages/send/:peer_id",
            post(handlers::messages::send_message_handler)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BODY_BYTES)),
        )
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        // Uploaded images
        .route(
            "/uploads/:file",
            get(handlers::uploads::serve_upload_handler),
        )
        .with_state(state)
}
