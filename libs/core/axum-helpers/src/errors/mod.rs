pub mod codes;
pub mod handlers;
pub mod responses;

pub use codes::ErrorCode;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

/// Standard error response structure.
///
/// This structure is returned for all error responses, providing consistent
/// error information to clients including
/// - `code`: Integer error code for logging/monitoring (e.g., 1103)
/// - `error`: Machine-readable error identifier (e.g., "DEPTH_EXCEEDED")
/// - `message`: Human-readable error message
/// - `details`: Optional additional error details (e.g., validation errors)
///
/// # JSON Example
///
/// ```json
/// {
///   "code": 1101,
///   "error": "DUPLICATE_NAME",
///   "message": "A category named 'Shoes' already exists under the same parent",
///   "details": null
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Integer error code for logging and monitoring
    pub code: i32,
    /// Machine-readable error identifier for programmatic handling
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional structured error details (e.g., validation field errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            error: code.as_str().to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Error returned by handlers. Every variant renders as an [`ErrorResponse`]
/// whose status comes from its [`ErrorCode`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("JSON extraction error: {0}")]
    JsonExtractorRejection(#[from] JsonRejection),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    /// A domain rule rejected the request; the status follows the code.
    #[error("{code}: {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("Internal Server Error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, response) = match self {
            AppError::Database(e) => map_db_error(&e),
            AppError::JsonExtractorRejection(e) => {
                tracing::warn!(
                    error_code = ErrorCode::JsonExtraction.code(),
                    "JSON extraction error: {:?}",
                    e
                );
                (
                    e.status(),
                    ErrorResponse::new(ErrorCode::JsonExtraction, e.body_text()),
                )
            }
            AppError::ValidationError(e) => {
                tracing::info!(
                    error_code = ErrorCode::ValidationError.code(),
                    "Validation error: {:?}",
                    e
                );
                let response =
                    ErrorResponse::new(ErrorCode::ValidationError, ErrorCode::ValidationError.default_message())
                        .with_details(validation_details(&e));
                (StatusCode::BAD_REQUEST, response)
            }
            AppError::InvalidId(raw) => {
                tracing::info!(error_code = ErrorCode::InvalidId.code(), "Invalid id: {}", raw);
                coded(ErrorCode::InvalidId, Some(format!("Invalid id: {}", raw)))
            }
            AppError::NotFound(msg) => {
                tracing::info!(error_code = ErrorCode::NotFound.code(), "Not found: {}", msg);
                coded(ErrorCode::NotFound, Some(msg))
            }
            AppError::Rejected { code, message } => {
                tracing::info!(error_code = code.code(), error = %code, "Request rejected: {}", message);
                coded(code, Some(message))
            }
            AppError::InternalServerError(msg) => {
                tracing::error!(
                    error_code = ErrorCode::InternalError.code(),
                    "Internal server error: {}",
                    msg
                );
                coded(ErrorCode::InternalError, None)
            }
        };

        (status, Json(response)).into_response()
    }
}

/// Status and body for `code`, falling back to its default message.
fn coded(code: ErrorCode, message: Option<String>) -> (StatusCode, ErrorResponse) {
    let message = message.unwrap_or_else(|| code.default_message().to_string());
    (code.status(), ErrorResponse::new(code, message))
}

/// Maps sea-orm errors to response components. Driver details stay in the logs.
fn map_db_error(error: &DbErr) -> (StatusCode, ErrorResponse) {
    match error {
        DbErr::ConnectionAcquire(e) => {
            tracing::warn!(
                error_code = ErrorCode::DatabaseConnection.code(),
                "Database connection unavailable: {:?}",
                e
            );
            coded(ErrorCode::DatabaseConnection, None)
        }
        DbErr::Migration(e) => {
            tracing::error!(
                error_code = ErrorCode::MigrationError.code(),
                "Database migration error: {}",
                e
            );
            coded(ErrorCode::MigrationError, None)
        }
        _ => {
            tracing::error!(
                error_code = ErrorCode::DatabaseError.code(),
                "Database error: {:?}",
                error
            );
            coded(ErrorCode::DatabaseError, None)
        }
    }
}

/// Field errors as `{ field: [{ code, message, params }] }`.
pub fn validation_details(errors: &ValidationErrors) -> serde_json::Value {
    let details = errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let entries: Vec<serde_json::Value> = errors
                .iter()
                .map(|err| {
                    serde_json::json!({
                        "code": err.code,
                        "message": err.message,
                        "params": err.params,
                    })
                })
                .collect();
            (field.to_string(), serde_json::json!(entries))
        })
        .collect::<serde_json::Map<_, _>>();

    serde_json::Value::Object(details)
}

/// Helper function to create error responses.
///
/// # Example
///
/// ```rust,ignore
/// use axum_helpers::errors::{error_response, ErrorCode};
///
/// let response = error_response(ErrorCode::NotFound, "No such category".to_string());
/// ```
pub fn error_response(error_code: ErrorCode, message: String) -> Response {
    (error_code.status(), Json(ErrorResponse::new(error_code, message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_rejected_uses_code_status() {
        let (status, body) = body_of(AppError::rejected(
            ErrorCode::DepthExceeded,
            "too deep",
        ))
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], 1103);
        assert_eq!(body["error"], "DEPTH_EXCEEDED");
        assert_eq!(body["message"], "too deep");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let (status, body) =
            body_of(AppError::InternalServerError("connection string leaked".into())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], ErrorCode::InternalError.default_message());
    }

    #[tokio::test]
    async fn test_invalid_id_is_bad_request() {
        let (status, body) = body_of(AppError::InvalidId("abc".into())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_ID");
    }

    #[tokio::test]
    async fn test_database_error_is_opaque() {
        let (status, body) = body_of(AppError::Database(DbErr::Custom("boom".into()))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "DATABASE_ERROR");
        assert!(!body["message"].as_str().unwrap().contains("boom"));
    }
}
