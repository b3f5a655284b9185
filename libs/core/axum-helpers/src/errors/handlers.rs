use axum::response::Response;

use super::{ErrorCode, error_response};

/// Router fallback answering unknown routes with a `NOT_FOUND` body.
pub async fn not_found() -> Response {
    error_response(
        ErrorCode::NotFound,
        "The requested resource was not found".to_string(),
    )
}

