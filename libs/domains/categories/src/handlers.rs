use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, patch},
};
use axum_helpers::{
    AuditEvent, AuditOutcome, IdPath, ValidatedJson,
    errors::responses::{
        BadRequestIdResponse, BadRequestValidationResponse, ConflictResponse,
        InternalServerErrorResponse, NotFoundResponse, UnprocessableEntityResponse,
    },
    extract_ip_from_headers, extract_user_agent,
};
use serde_json::json;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::entity;
use crate::error::CategoryResult;
use crate::models::{
    BatchUpdateResult, BatchUpdateShowInNav, BatchUpdateStatus, Category, CategoryDetail,
    CategoryFilter, CategoryPage, CategoryTreeNode, CreateCategory, MoveCategory, TopLevelFilter,
    TreeFilter, UpdateCategory, UpdateShowInNav, UpdateStatus,
};
use crate::repository::CategoryRepository;
use crate::service::CategoryService;

/// OpenAPI documentation for Categories API
#[derive(OpenApi)]
#[openapi(
    paths(
        list_categories,
        create_category,
        get_tree,
        get_top_level_categories,
        batch_update_status,
        batch_update_show_in_nav,
        get_category,
        update_category,
        delete_category,
        get_all_children,
        move_category,
        update_status,
        update_show_in_nav,
    ),
    components(
        schemas(
            Category,
            CategoryDetail,
            CategoryTreeNode,
            CategoryPage,
            CreateCategory,
            UpdateCategory,
            MoveCategory,
            UpdateStatus,
            BatchUpdateStatus,
            UpdateShowInNav,
            BatchUpdateShowInNav,
            BatchUpdateResult,
        ),
        responses(
            NotFoundResponse,
            BadRequestValidationResponse,
            BadRequestIdResponse,
            ConflictResponse,
            UnprocessableEntityResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = entity::Model::TAG, description = "Hierarchical category management endpoints")
    )
)]
pub struct ApiDoc;

/// Create the category router with all HTTP endpoints
pub fn router<R: CategoryRepository + 'static>(service: CategoryService<R>) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/tree", get(get_tree))
        .route("/top-level", get(get_top_level_categories))
        .route("/batch/status", patch(batch_update_status))
        .route("/batch/show-in-nav", patch(batch_update_show_in_nav))
        .route(
            "/{id}",
            get(get_category)
                .patch(update_category)
                .delete(delete_category),
        )
        .route("/{id}/children", get(get_all_children))
        .route("/{id}/move", patch(move_category))
        .route("/{id}/status", patch(update_status))
        .route("/{id}/show-in-nav", patch(update_show_in_nav))
        .with_state(shared_service)
}

fn audit(headers: &HeaderMap, action: &str, resource: String) -> AuditEvent {
    AuditEvent::new(action, Some(resource), AuditOutcome::Success)
        .with_ip(extract_ip_from_headers(headers))
        .with_user_agent(extract_user_agent(headers))
}

/// List categories, paginated, each with its parent and direct children
#[utoipa::path(
    get,
    path = "",
    tag = entity::Model::TAG,
    params(CategoryFilter),
    responses(
        (status = 200, description = "One page of categories", body = CategoryPage),
        (status = 400, response = BadRequestValidationResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_categories<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    Query(filter): Query<CategoryFilter>,
) -> CategoryResult<Json<CategoryPage>> {
    let page = service.list_categories(filter).await?;
    Ok(Json(page))
}

/// Create a new category
#[utoipa::path(
    post,
    path = "",
    tag = entity::Model::TAG,
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created successfully", body = Category),
        (status = 400, response = BadRequestValidationResponse),
        (status = 409, response = ConflictResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn create_category<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    ValidatedJson(input): ValidatedJson<CreateCategory>,
) -> CategoryResult<impl IntoResponse> {
    let category = service.create_category(input).await?;

    audit(&headers, "category.create", format!("category:{}", category.id))
        .with_details(json!({
            "name": category.name,
            "parent_id": category.parent_id,
            "level": category.level,
        }))
        .log();

    Ok((StatusCode::CREATED, Json(category)))
}

/// Get the category tree
#[utoipa::path(
    get,
    path = "/tree",
    tag = entity::Model::TAG,
    params(TreeFilter),
    responses(
        (status = 200, description = "Category forest", body = Vec<CategoryTreeNode>),
        (status = 400, response = BadRequestValidationResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_tree<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    Query(filter): Query<TreeFilter>,
) -> CategoryResult<Json<Vec<CategoryTreeNode>>> {
    let forest = service.get_tree(filter).await?;
    Ok(Json(forest))
}

/// List top-level categories
#[utoipa::path(
    get,
    path = "/top-level",
    tag = entity::Model::TAG,
    params(TopLevelFilter),
    responses(
        (status = 200, description = "Top-level categories", body = Vec<Category>),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_top_level_categories<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    Query(filter): Query<TopLevelFilter>,
) -> CategoryResult<Json<Vec<Category>>> {
    let categories = service.get_top_level_categories(filter.status).await?;
    Ok(Json(categories))
}

/// Set the status of several categories and their descendants
#[utoipa::path(
    patch,
    path = "/batch/status",
    tag = entity::Model::TAG,
    request_body = BatchUpdateStatus,
    responses(
        (status = 200, description = "Statuses updated", body = BatchUpdateResult),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn batch_update_status<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    ValidatedJson(input): ValidatedJson<BatchUpdateStatus>,
) -> CategoryResult<Json<BatchUpdateResult>> {
    let ids = input.ids.clone();
    let result = service.batch_update_status(input.ids, input.status).await?;

    audit(&headers, "category.batch_status", "category:batch".to_string())
        .with_details(json!({
            "ids": ids,
            "status": i16::from(input.status),
            "updated": result.updated,
        }))
        .log();

    Ok(Json(result))
}

/// Show or hide several categories and their descendants in navigation
#[utoipa::path(
    patch,
    path = "/batch/show-in-nav",
    tag = entity::Model::TAG,
    request_body = BatchUpdateShowInNav,
    responses(
        (status = 200, description = "Visibility updated", body = BatchUpdateResult),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn batch_update_show_in_nav<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    ValidatedJson(input): ValidatedJson<BatchUpdateShowInNav>,
) -> CategoryResult<Json<BatchUpdateResult>> {
    let ids = input.ids.clone();
    let result = service
        .batch_update_show_in_nav(input.ids, input.show_in_nav)
        .await?;

    audit(&headers, "category.batch_show_in_nav", "category:batch".to_string())
        .with_details(json!({
            "ids": ids,
            "show_in_nav": input.show_in_nav,
            "updated": result.updated,
        }))
        .log();

    Ok(Json(result))
}

/// Get a category with its parent and direct children
#[utoipa::path(
    get,
    path = "/{id}",
    tag = entity::Model::TAG,
    params(
        ("id" = i64, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "Category found", body = CategoryDetail),
        (status = 400, response = BadRequestIdResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_category<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    IdPath(id): IdPath,
) -> CategoryResult<Json<CategoryDetail>> {
    let detail = service.find_one(id).await?;
    Ok(Json(detail))
}

/// Update a category
#[utoipa::path(
    patch,
    path = "/{id}",
    tag = entity::Model::TAG,
    params(
        ("id" = i64, Path, description = "Category ID")
    ),
    request_body = UpdateCategory,
    responses(
        (status = 200, description = "Category updated successfully", body = Category),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn update_category<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    IdPath(id): IdPath,
    ValidatedJson(input): ValidatedJson<UpdateCategory>,
) -> CategoryResult<Json<Category>> {
    let category = service.update_category(id, input).await?;

    audit(&headers, "category.update", format!("category:{}", id))
        .with_details(json!({
            "name": category.name,
            "parent_id": category.parent_id,
        }))
        .log();

    Ok(Json(category))
}

/// Delete a category without children
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = entity::Model::TAG,
    params(
        ("id" = i64, Path, description = "Category ID")
    ),
    responses(
        (status = 204, description = "Category deleted successfully"),
        (status = 400, response = BadRequestIdResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn delete_category<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    IdPath(id): IdPath,
) -> CategoryResult<impl IntoResponse> {
    service.delete_category(id).await?;

    audit(&headers, "category.delete", format!("category:{}", id)).log();

    Ok(StatusCode::NO_CONTENT)
}

/// List every descendant of a category
#[utoipa::path(
    get,
    path = "/{id}/children",
    tag = entity::Model::TAG,
    params(
        ("id" = i64, Path, description = "Category ID")
    ),
    responses(
        (status = 200, description = "All descendants", body = Vec<Category>),
        (status = 400, response = BadRequestIdResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn get_all_children<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    IdPath(id): IdPath,
) -> CategoryResult<Json<Vec<Category>>> {
    let descendants = service.get_all_children(id).await?;
    Ok(Json(descendants))
}

/// Move a category under a new parent
#[utoipa::path(
    patch,
    path = "/{id}/move",
    tag = entity::Model::TAG,
    params(
        ("id" = i64, Path, description = "Category ID")
    ),
    request_body = MoveCategory,
    responses(
        (status = 200, description = "Category moved successfully", body = Category),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn move_category<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    IdPath(id): IdPath,
    ValidatedJson(input): ValidatedJson<MoveCategory>,
) -> CategoryResult<Json<Category>> {
    let category = service.move_category(id, input).await?;

    audit(&headers, "category.move", format!("category:{}", id))
        .with_details(json!({
            "parent_id": category.parent_id,
            "level": category.level,
            "path": category.path,
        }))
        .log();

    Ok(Json(category))
}

/// Set the status of a category and its descendants
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tag = entity::Model::TAG,
    params(
        ("id" = i64, Path, description = "Category ID")
    ),
    request_body = UpdateStatus,
    responses(
        (status = 200, description = "Status updated", body = Category),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn update_status<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    IdPath(id): IdPath,
    ValidatedJson(input): ValidatedJson<UpdateStatus>,
) -> CategoryResult<Json<Category>> {
    let category = service.update_status(id, input.status).await?;

    audit(&headers, "category.status", format!("category:{}", id))
        .with_details(json!({ "status": i16::from(input.status) }))
        .log();

    Ok(Json(category))
}

/// Show or hide a category and its descendants in navigation
#[utoipa::path(
    patch,
    path = "/{id}/show-in-nav",
    tag = entity::Model::TAG,
    params(
        ("id" = i64, Path, description = "Category ID")
    ),
    request_body = UpdateShowInNav,
    responses(
        (status = 200, description = "Visibility updated", body = Category),
        (status = 400, response = BadRequestValidationResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn update_show_in_nav<R: CategoryRepository>(
    State(service): State<Arc<CategoryService<R>>>,
    headers: HeaderMap,
    IdPath(id): IdPath,
    ValidatedJson(input): ValidatedJson<UpdateShowInNav>,
) -> CategoryResult<Json<Category>> {
    let category = service.update_show_in_nav(id, input.show_in_nav).await?;

    audit(&headers, "category.show_in_nav", format!("category:{}", id))
        .with_details(json!({ "show_in_nav": input.show_in_nav }))
        .log();

    Ok(Json(category))
}
