use crate::{errors::ServiceError, AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};

/// Creates the router for provider webhook delivery
pub fn webhooks_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}

/// Receive a signed payment event from the checkout provider.
///
/// The signature is verified against the raw body before any parsing; a
/// bad signature is rejected with 401 and triggers no fulfillment. The
/// provider redelivers on non-2xx responses, which is safe because the
/// reconciler fulfills at most once per session.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.payments.handle_webhook(&headers, &body).await?;
    Ok((StatusCode::OK, "ok"))
}
