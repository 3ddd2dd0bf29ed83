use crate::handlers::common::{created_response, success_response, validate_input};
use crate::services::promos::{CartSnapshot, CreatePromoInput};
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Json, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for promo-code endpoints
pub fn promos_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_promo))
        .route("/", get(list_promos))
        .route("/validate", post(validate_promo))
}

/// Strict promo validation against the current cart.
///
/// Unlike order creation, this surfaces each failure with its own error
/// kind so the storefront can tell the shopper why a code was refused.
async fn validate_promo(
    State(state): State<AppState>,
    Json(payload): Json<ValidatePromoRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let cart = state.services.carts.get_cart(&payload.session_id).await?;
    if cart.items.is_empty() {
        return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
    }

    let product_ids: Vec<Uuid> = cart.items.iter().map(|item| item.product_id).collect();
    let categories = state
        .services
        .products
        .categories_of(&*state.db, &product_ids)
        .await?;

    let quote = state
        .services
        .promos
        .validate(
            &payload.code,
            &CartSnapshot {
                subtotal: cart.subtotal,
                product_ids,
                categories,
            },
        )
        .await?;

    Ok(success_response(quote))
}

/// Create a promo code; duplicate codes are rejected with 409
async fn create_promo(
    State(state): State<AppState>,
    Json(payload): Json<CreatePromoInput>,
) -> Result<Response, ServiceError> {
    let promo = state.services.promos.create_promo(payload).await?;
    Ok(created_response(promo))
}

/// List promo codes
async fn list_promos(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let promos = state.services.promos.list_promos().await?;
    Ok(success_response(promos))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct ValidatePromoRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(length(min = 1))]
    pub session_id: String,
}
