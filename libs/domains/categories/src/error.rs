use axum::response::{IntoResponse, Response};
use axum_helpers::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("Category not found: {0}")]
    NotFound(i64),

    #[error("A category named '{0}' already exists under the same parent")]
    DuplicateName(String),

    #[error("Parent category not found: {0}")]
    ParentNotFound(i64),

    #[error("Category would sit at level {level}, the deepest allowed level is {max}")]
    DepthExceeded { level: i32, max: i32 },

    #[error("Category {id} cannot be placed under {parent_id}, which is itself or one of its descendants")]
    CircularReference { id: i64, parent_id: i64 },

    #[error("Category {0} still has child categories")]
    HasChildren(i64),

    #[error("Category {0} was changed by another request, retry the operation")]
    ConcurrentModification(i64),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CategoryResult<T> = Result<T, CategoryError>;

/// Convert CategoryError to AppError for standardized error responses
impl From<CategoryError> for AppError {
    fn from(err: CategoryError) -> Self {
        let message = err.to_string();
        match err {
            CategoryError::NotFound(_) => AppError::NotFound(message),
            CategoryError::DuplicateName(_) => AppError::rejected(ErrorCode::DuplicateName, message),
            CategoryError::ParentNotFound(_) => AppError::rejected(ErrorCode::ParentNotFound, message),
            CategoryError::DepthExceeded { .. } => AppError::rejected(ErrorCode::DepthExceeded, message),
            CategoryError::CircularReference { .. } => {
                AppError::rejected(ErrorCode::CircularReference, message)
            }
            CategoryError::HasChildren(_) => AppError::rejected(ErrorCode::HasChildren, message),
            CategoryError::ConcurrentModification(_) => {
                AppError::rejected(ErrorCode::ConcurrentModification, message)
            }
            CategoryError::Validation(msg) => AppError::rejected(ErrorCode::ValidationError, msg),
            CategoryError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for CategoryError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

impl From<sea_orm::DbErr> for CategoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        CategoryError::Internal(format!("Database error: {}", err))
    }
}

impl From<validator::ValidationErrors> for CategoryError {
    fn from(err: validator::ValidationErrors) -> Self {
        CategoryError::Validation(err.to_string())
    }
}
