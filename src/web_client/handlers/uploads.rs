//! Serves stored images.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::web_client::state::SharedState;
use crate::web_client::utils::api_error;

/// GET /uploads/:file
pub async fn serve_upload_handler(
    State(state): State<SharedState>,
    Path(file): Path<String>,
) -> Response {
    let Some((path, content_type)) = state.uploads.resolve(&file) else {
        return api_error(StatusCode::NOT_FOUND, "not found");
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                // Names are content hashes, so the bytes never change.
                (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            api_error(StatusCode::NOT_FOUND, "not found")
        }
        Err(e) => {
            tracing::error!("uploads: failed to read {}: {e}", path.display());
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to read upload")
        }
    }
}
