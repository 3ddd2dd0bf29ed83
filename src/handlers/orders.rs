use crate::handlers::common::{created_response, success_response, validate_input};
use crate::services::orders::CreateOrderInput;
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/tracking", put(set_tracking))
}

/// Create an order from a session's cart.
///
/// Pricing is recomputed server-side; an invalid promo code is ignored and
/// the order succeeds without a discount.
async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let order = state
        .services
        .orders
        .create_order(CreateOrderInput {
            session_id: payload.session_id,
            customer_name: payload.customer_name,
            customer_email: payload.customer_email,
            customer_phone: payload.customer_phone,
            shipping_address: payload.shipping_address,
            shipping_zone: payload.shipping_zone,
            promo_code: payload.promo_code,
        })
        .await?;

    Ok(created_response(order))
}

/// Get an order with its item snapshot
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    Ok(success_response(order))
}

/// List orders, newest first
async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(params.page, params.per_page)
        .await?;

    Ok(success_response(OrderListResponse {
        orders,
        total,
        page: params.page,
        per_page: params.per_page,
    }))
}

/// Admin status transition (pending -> shipped -> delivered, or cancel
/// before payment)
async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(id, &payload.status)
        .await?;
    Ok(success_response(order))
}

/// Record a tracking number
async fn set_tracking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetTrackingRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let order = state
        .services
        .orders
        .set_tracking(id, payload.tracking_number)
        .await?;
    Ok(success_response(order))
}

// Request/response DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    #[validate(length(min = 1))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1))]
    pub customer_phone: String,
    #[validate(length(min = 1))]
    pub shipping_address: String,
    #[validate(length(min = 1))]
    pub shipping_zone: String,
    #[serde(default)]
    pub promo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetTrackingRequest {
    #[validate(length(min = 1))]
    pub tracking_number: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<crate::entities::OrderModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}
