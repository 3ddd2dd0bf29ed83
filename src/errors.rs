use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

/// JSON body returned for every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Promo-code validation failures.
///
/// Each step of the validation sequence has its own kind so the storefront
/// can show the shopper why a code was refused. Order placement swallows
/// these and proceeds without a discount; only `POST /promos/validate`
/// surfaces them directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum PromoError {
    #[error("Promo code not found")]
    NotFound,

    #[error("Promo code has expired or is not yet valid")]
    Expired,

    #[error("Order subtotal is below the minimum of {0} for this code")]
    BelowMinimum(Decimal),

    #[error("Promo code has reached its usage limit")]
    Exhausted,

    #[error("Promo code does not apply to any item in the cart")]
    NotApplicable,
}

impl PromoError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "promo_not_found",
            Self::Expired => "promo_expired",
            Self::BelowMinimum(_) => "promo_below_minimum",
            Self::Exhausted => "promo_exhausted",
            Self::NotApplicable => "promo_not_applicable",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error(transparent)]
    Promo(#[from] PromoError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment provider not configured: {0}")]
    ProviderUnavailable(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Promo(PromoError::NotFound) => StatusCode::NOT_FOUND,
            Self::Promo(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
        }
    }

    /// Machine-readable code carried in the response body.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::InvalidStatus(_) => "invalid_status",
            Self::Promo(err) => err.code(),
            Self::Conflict(_) => "conflict",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::ExternalServiceError(_) => "external_service_error",
            Self::SignatureInvalid => "signature_invalid",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Message suitable for HTTP responses. Internal errors return a generic
    /// message so implementation details never leak to clients.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            code: self.error_code().to_string(),
            message: self.response_message(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn promo_errors_map_to_unprocessable_except_not_found() {
        assert_eq!(
            ServiceError::Promo(PromoError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        for err in [
            PromoError::Expired,
            PromoError::BelowMinimum(dec!(30)),
            PromoError::Exhausted,
            PromoError::NotApplicable,
        ] {
            assert_eq!(
                ServiceError::Promo(err).status_code(),
                StatusCode::UNPROCESSABLE_ENTITY
            );
        }
    }

    #[test]
    fn database_errors_do_not_leak_details() {
        let err = ServiceError::DatabaseError(DbErr::Custom("secret dsn".to_string()));
        assert_eq!(err.response_message(), "Database error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn signature_failures_are_unauthorized() {
        let err = ServiceError::SignatureInvalid;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), "signature_invalid");
    }

    #[test]
    fn provider_unavailable_is_retryable_service_unavailable() {
        let err = ServiceError::ProviderUnavailable("no api key".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
