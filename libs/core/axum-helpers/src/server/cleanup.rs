//! Connection cleanup run during graceful shutdown.

use tracing::{error, info};

/// Close a SeaORM PostgreSQL connection pool and log the outcome.
///
/// # Example
/// ```ignore
/// use axum_helpers::server::close_postgres;
///
/// let cleanup = async move { close_postgres(db, "catalog").await };
/// ```
pub async fn close_postgres(db: sea_orm::DatabaseConnection, name: &str) {
    match db.close().await {
        Ok(_) => info!("PostgreSQL connection '{}' closed successfully", name),
        Err(e) => error!("Error closing PostgreSQL connection '{}': {}", name, e),
    }
}
