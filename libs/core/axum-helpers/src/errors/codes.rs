//! Type-safe error codes for API responses.
//!
//! Each code carries its wire name, a numeric code for log correlation,
//! a default message and the HTTP status it is answered with.
//!
//! # Example
//!
//! ```rust
//! use axum_helpers::errors::ErrorCode;
//!
//! let code = ErrorCode::ValidationError;
//! assert_eq!(code.as_str(), "VALIDATION_ERROR");
//! assert_eq!(code.code(), 1001);
//! assert_eq!(code.default_message(), "Request validation failed");
//! ```

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standardized error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (1000-1099)
    /// Request validation failed
    ValidationError,

    /// Path id is not a valid integer identifier
    InvalidId,

    /// JSON extraction from request body failed
    JsonExtraction,

    /// Requested resource was not found
    NotFound,

    // Hierarchy errors (1100-1199)
    /// A sibling with the same name already exists
    DuplicateName,

    /// The referenced parent does not exist
    ParentNotFound,

    /// The node would sit deeper than the maximum depth
    DepthExceeded,

    /// The node would become its own ancestor
    CircularReference,

    /// The node still has children
    HasChildren,

    /// The node changed while the request was being applied
    ConcurrentModification,

    // Server errors
    /// An unexpected internal server error occurred
    InternalError,

    // Database errors (2000-2999)
    /// Database connection or query error
    DatabaseError,

    /// No database connection could be acquired
    DatabaseConnection,

    // Migration errors (3000s)
    /// Database migration failed
    MigrationError,
}

impl ErrorCode {
    /// Get the string representation for client consumption.
    ///
    /// # Example
    ///
    /// ```rust
    /// use axum_helpers::errors::ErrorCode;
    ///
    /// assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
    /// assert_eq!(ErrorCode::DepthExceeded.as_str(), "DEPTH_EXCEEDED");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidId => "INVALID_ID",
            Self::JsonExtraction => "JSON_EXTRACTION",
            Self::NotFound => "NOT_FOUND",
            Self::DuplicateName => "DUPLICATE_NAME",
            Self::ParentNotFound => "PARENT_NOT_FOUND",
            Self::DepthExceeded => "DEPTH_EXCEEDED",
            Self::CircularReference => "CIRCULAR_REFERENCE",
            Self::HasChildren => "HAS_CHILDREN",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::InternalError => "INTERNAL_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseConnection => "DATABASE_CONNECTION",
            Self::MigrationError => "MIGRATION_ERROR",
        }
    }

    /// Get the integer code for logging and monitoring.
    ///
    /// Ranges:
    /// - 1000-1099: Client errors
    /// - 1100-1199: Hierarchy rule violations
    /// - 2000-2999: Database errors
    /// - 3000-3999: Migration errors
    pub fn code(&self) -> i32 {
        match self {
            // Client errors
            Self::ValidationError => 1001,
            Self::InvalidId => 1002,
            Self::JsonExtraction => 1003,
            Self::NotFound => 1004,
            Self::InternalError => 1005,

            // Hierarchy errors
            Self::DuplicateName => 1101,
            Self::ParentNotFound => 1102,
            Self::DepthExceeded => 1103,
            Self::CircularReference => 1104,
            Self::HasChildren => 1105,
            Self::ConcurrentModification => 1106,

            // Database errors
            Self::DatabaseError => 2003,
            Self::DatabaseConnection => 2013,

            Self::MigrationError => 3001,
        }
    }

    /// Get the default user-facing error message.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::ValidationError => "Request validation failed",
            Self::InvalidId => "Invalid id format",
            Self::JsonExtraction => "Failed to parse request body",
            Self::NotFound => "Resource not found",
            Self::DuplicateName => "A sibling with the same name already exists",
            Self::ParentNotFound => "Parent not found",
            Self::DepthExceeded => "Maximum depth exceeded",
            Self::CircularReference => "A node cannot be moved below itself",
            Self::HasChildren => "Resource still has children",
            Self::ConcurrentModification => "Resource was modified concurrently",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database error occurred",
            Self::DatabaseConnection => "Database connection unavailable",
            Self::MigrationError => "Migration error",
        }
    }

    /// HTTP status answered for this code.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError | Self::InvalidId | Self::JsonExtraction => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateName
            | Self::HasChildren
            | Self::ConcurrentModification => StatusCode::CONFLICT,
            Self::ParentNotFound
            | Self::DepthExceeded
            | Self::CircularReference => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DatabaseConnection => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError
            | Self::DatabaseError
            | Self::MigrationError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_string_representation() {
        assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
        assert_eq!(ErrorCode::NotFound.as_str(), "NOT_FOUND");
        assert_eq!(ErrorCode::CircularReference.as_str(), "CIRCULAR_REFERENCE");
    }

    #[test]
    fn test_error_code_integer_codes() {
        assert_eq!(ErrorCode::ValidationError.code(), 1001);
        assert_eq!(ErrorCode::DepthExceeded.code(), 1103);
        assert_eq!(ErrorCode::DatabaseError.code(), 2003);
        assert_eq!(ErrorCode::MigrationError.code(), 3001);
    }

    #[test]
    fn test_hierarchy_codes_map_to_client_statuses() {
        assert_eq!(ErrorCode::DuplicateName.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::HasChildren.status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::ParentNotFound.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::DepthExceeded.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::DatabaseConnection.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::InvalidId.to_string(), "INVALID_ID");
    }

    #[test]
    fn test_error_code_serde() {
        let json = serde_json::to_string(&ErrorCode::ConcurrentModification).unwrap();
        assert_eq!(json, "\"CONCURRENT_MODIFICATION\"");

        let code: ErrorCode = serde_json::from_str("\"VALIDATION_ERROR\"").unwrap();
        assert_eq!(code, ErrorCode::ValidationError);
    }
}
