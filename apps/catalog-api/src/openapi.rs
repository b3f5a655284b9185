use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(schemas(axum_helpers::ErrorResponse)),
    info(
        title = "Catalog API",
        version = "0.1.0",
        description = "Hierarchical product categories: tree queries, moves and cascading visibility"
    ),
    servers((url = "/api", description = "API base path")),
    nest((path = "/categories", api = domain_categories::handlers::ApiDoc))
)]
pub struct ApiDoc;
