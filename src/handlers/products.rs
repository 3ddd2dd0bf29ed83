use crate::handlers::common::{created_response, no_content_response, success_response};
use crate::services::products::{CreateProductInput, UpdateProductInput};
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use uuid::Uuid;

/// Creates the router for catalog endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/", post(create_product))
        .route("/:id", get(get_product))
        .route("/:id", put(update_product))
        .route("/:id", delete(delete_product))
}

/// List active products
async fn list_products(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let products = state.services.products.list_active().await?;
    Ok(success_response(products))
}

/// Get a product by id
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let product = state.services.products.find_product(id).await?;
    Ok(success_response(product))
}

/// Create a product
async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<Response, ServiceError> {
    let product = state.services.products.create_product(payload).await?;
    Ok(created_response(product))
}

/// Update a product
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<Response, ServiceError> {
    let product = state.services.products.update_product(id, payload).await?;
    Ok(success_response(product))
}

/// Delete a product
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.products.delete_product(id).await?;
    Ok(no_content_response())
}
