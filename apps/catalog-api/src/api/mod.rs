use axum::Router;
use domain_categories::{CategoryService, PgCategoryRepository, handlers};

pub mod health;

/// API routes without the `/api` prefix, which `create_router` adds.
pub fn routes(state: &crate::state::AppState) -> Router {
    let service = CategoryService::new(PgCategoryRepository::new(state.db.clone()));

    Router::new().nest("/categories", handlers::router(service))
}

/// `/ready`, with state applied so it merges into the stateless app router.
pub fn ready_router(state: crate::state::AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/ready", get(health::ready_handler))
        .with_state(state)
}
