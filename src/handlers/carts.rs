use crate::handlers::common::{created_response, no_content_response, success_response, validate_input};
use crate::services::carts::AddToCartInput;
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(add_to_cart))
        .route("/:session_id", get(get_cart))
        .route("/:session_id", delete(clear_cart))
        .route("/:session_id/items/:item_id", delete(remove_cart_item))
}

/// Add an item to a session's cart
async fn add_to_cart(
    State(state): State<AppState>,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let item = state
        .services
        .carts
        .add_item(AddToCartInput {
            session_id: payload.session_id,
            product_id: payload.product_id,
            quantity: payload.quantity,
            with_charm: payload.with_charm,
        })
        .await?;

    Ok(created_response(item))
}

/// Get a session's cart with its subtotal
async fn get_cart(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.get_cart(&session_id).await?;
    Ok(success_response(cart))
}

/// Remove one line from a session's cart
async fn remove_cart_item(
    State(state): State<AppState>,
    Path((session_id, item_id)): Path<(String, Uuid)>,
) -> Result<Response, ServiceError> {
    state
        .services
        .carts
        .remove_item(&session_id, item_id)
        .await?;
    Ok(no_content_response())
}

/// Clear a session's cart
async fn clear_cart(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ServiceError> {
    state.services.carts.clear_cart(&session_id).await?;
    Ok(no_content_response())
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[serde(default)]
    pub with_charm: bool,
}
