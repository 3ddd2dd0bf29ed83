use crate::handlers::common::{created_response, success_response};
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Creates the router for checkout-session endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_checkout_session))
        .route("/status/:session_id", get(poll_payment_status))
}

/// Start a hosted checkout session for an order.
///
/// Answers 503 when no payment provider is configured.
async fn create_checkout_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Response, ServiceError> {
    let session = state
        .services
        .payments
        .start_checkout(payload.order_id)
        .await?;
    Ok(created_response(session))
}

/// Poll the provider for a session's payment state and reconcile it.
///
/// Provider failures surface as 502 and may be retried by the caller.
async fn poll_payment_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ServiceError> {
    let status = state.services.payments.poll_status(&session_id).await?;
    Ok(success_response(status))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
}
