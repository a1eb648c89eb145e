//! Shared utility functions for the web client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::{CoreError, ErrorKind};

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::SelfTarget => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::AlreadyRelated => StatusCode::CONFLICT,
        ErrorKind::UploadFailed | ErrorKind::EmailDeliveryFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a core failure onto its HTTP status with a `{error, kind}` body.
pub fn core_error(err: CoreError) -> Response {
    let kind = err.kind();
    if kind == ErrorKind::StorageError {
        tracing::error!("storage failure: {err}");
    }
    let body = serde_json::json!({
        "error": err.public_message(),
        "kind": kind.as_str(),
    });
    (status_for(kind), axum::Json(body)).into_response()
}

/// JSON `{"message": ...}` acknowledgement.
pub fn ok_message(message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "message": message.into() });
    (StatusCode::OK, axum::Json(body)).into_response()
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::SelfTarget), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::AlreadyRelated), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::UploadFailed), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(ErrorKind::StorageError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn core_error_sets_status() {
        let resp = core_error(CoreError::ExpiredCode);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = core_error(CoreError::forbidden("no"));
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
