use crate::config::CheckoutConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Result of creating a hosted checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionInfo {
    pub session_id: String,
    /// Hosted payment page the shopper is redirected to
    pub url: String,
}

/// Session state as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSessionStatus {
    /// Session lifecycle status ("open", "complete", "expired")
    pub status: String,
    /// Payment outcome ("unpaid", "paid", "failed")
    pub payment_status: String,
    pub amount_total: Decimal,
    pub currency: String,
}

impl ProviderSessionStatus {
    pub fn is_paid(&self) -> bool {
        self.payment_status.eq_ignore_ascii_case("paid")
    }

    pub fn is_failed(&self) -> bool {
        self.payment_status.eq_ignore_ascii_case("failed")
            || self.status.eq_ignore_ascii_case("expired")
    }
}

/// A payment event delivered by webhook, after signature verification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl WebhookEvent {
    /// Checkout session id carried in the event payload, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.data
            .get("object")
            .and_then(|o| o.get("id"))
            .and_then(|v| v.as_str())
    }

    pub fn payment_status(&self) -> Option<&str> {
        self.data
            .get("object")
            .and_then(|o| o.get("payment_status"))
            .and_then(|v| v.as_str())
    }
}

/// Hosted checkout provider collaborator.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(
        &self,
        amount: Decimal,
        currency: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CheckoutSessionInfo, ServiceError>;

    async fn get_status(&self, session_id: &str) -> Result<ProviderSessionStatus, ServiceError>;
}

/// HTTP client for the checkout provider's REST API.
///
/// All calls carry a bounded timeout; timeouts and transport errors surface
/// as `ExternalServiceError`, which the HTTP layer maps to a retryable 502.
pub struct HttpCheckoutProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpCheckoutProvider {
    /// Builds a provider client from config. Returns `None` when the
    /// provider is not configured; checkout endpoints then answer 503.
    pub fn from_config(cfg: &CheckoutConfig) -> Option<Self> {
        let base_url = cfg.api_url.clone()?;
        let api_key = cfg.api_key.clone()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct CreateSessionBody<'a> {
    amount: Decimal,
    currency: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
    metadata: HashMap<String, String>,
}

#[async_trait]
impl CheckoutProvider for HttpCheckoutProvider {
    async fn create_session(
        &self,
        amount: Decimal,
        currency: &str,
        success_url: &str,
        cancel_url: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CheckoutSessionInfo, ServiceError> {
        let body = CreateSessionBody {
            amount,
            currency,
            success_url,
            cancel_url,
            metadata,
        };

        let response = self
            .client
            .post(self.endpoint("v1/checkout/sessions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Checkout session creation failed: {}", e);
                ServiceError::ExternalServiceError(format!("provider request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ServiceError::ExternalServiceError(format!(
                "provider returned {}",
                status
            )));
        }

        response.json::<CheckoutSessionInfo>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid provider response: {}", e))
        })
    }

    async fn get_status(&self, session_id: &str) -> Result<ProviderSessionStatus, ServiceError> {
        let response = self
            .client
            .get(self.endpoint(&format!("v1/checkout/sessions/{}", session_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                warn!(%session_id, "Checkout status query failed: {}", e);
                ServiceError::ExternalServiceError(format!("provider request failed: {}", e))
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "Checkout session {} not found at provider",
                session_id
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            return Err(ServiceError::ExternalServiceError(format!(
                "provider returned {}",
                status
            )));
        }

        response.json::<ProviderSessionStatus>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid provider response: {}", e))
        })
    }
}

/// Verifies a webhook's HMAC signature and parses the event.
///
/// Supports the provider's `Signature` header of the form `t=<ts>,v1=<hex>`,
/// signing `"{t}.{body}"` with SHA-256. Stale timestamps beyond the
/// configured tolerance are rejected.
pub fn verify_and_parse_webhook(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> Result<WebhookEvent, ServiceError> {
    let header = headers
        .get("signature")
        .or_else(|| headers.get("stripe-signature"))
        .and_then(|h| h.to_str().ok())
        .ok_or(ServiceError::SignatureInvalid)?;

    let mut ts = "";
    let mut v1 = "";
    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }

    if ts.is_empty() || v1.is_empty() {
        return Err(ServiceError::SignatureInvalid);
    }

    if let Ok(ts_i) = ts.parse::<i64>() {
        let now = chrono::Utc::now().timestamp();
        if (now - ts_i).unsigned_abs() > tolerance_secs {
            debug!("Webhook timestamp outside tolerance window");
            return Err(ServiceError::SignatureInvalid);
        }
    } else {
        return Err(ServiceError::SignatureInvalid);
    }

    let signed = [ts.as_bytes(), b".", payload].concat();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::SignatureInvalid)?;
    mac.update(&signed);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(&expected, v1) {
        return Err(ServiceError::SignatureInvalid);
    }

    serde_json::from_slice(payload)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {}", e)))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Builds a `Signature` header value for a payload. Used by tests and by
/// local tooling that replays webhooks.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signed = [timestamp.to_string().as_bytes(), b".", payload].concat();
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&signed);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_signature(sig: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("signature", HeaderValue::from_str(sig).unwrap());
        headers
    }

    fn sample_payload() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_abc",
                    "payment_status": "paid"
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn valid_signature_parses_event() {
        let payload = sample_payload();
        let now = chrono::Utc::now().timestamp();
        let sig = sign_webhook_payload(&payload, "whsec_test", now);

        let event =
            verify_and_parse_webhook(&headers_with_signature(&sig), &payload, "whsec_test", 300)
                .expect("signature should verify");

        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.session_id(), Some("cs_test_abc"));
        assert_eq!(event.payment_status(), Some("paid"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = sample_payload();
        let now = chrono::Utc::now().timestamp();
        let sig = sign_webhook_payload(&payload, "whsec_other", now);

        let result =
            verify_and_parse_webhook(&headers_with_signature(&sig), &payload, "whsec_test", 300);
        assert!(matches!(result, Err(ServiceError::SignatureInvalid)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = sample_payload();
        let now = chrono::Utc::now().timestamp();
        let sig = sign_webhook_payload(&payload, "whsec_test", now);

        let mut tampered = payload.clone();
        tampered[0] ^= 1;

        let result =
            verify_and_parse_webhook(&headers_with_signature(&sig), &tampered, "whsec_test", 300);
        assert!(matches!(result, Err(ServiceError::SignatureInvalid)));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = sample_payload();
        let stale = chrono::Utc::now().timestamp() - 3600;
        let sig = sign_webhook_payload(&payload, "whsec_test", stale);

        let result =
            verify_and_parse_webhook(&headers_with_signature(&sig), &payload, "whsec_test", 300);
        assert!(matches!(result, Err(ServiceError::SignatureInvalid)));
    }

    #[test]
    fn missing_header_is_rejected() {
        let payload = sample_payload();
        let result = verify_and_parse_webhook(&HeaderMap::new(), &payload, "whsec_test", 300);
        assert!(matches!(result, Err(ServiceError::SignatureInvalid)));
    }
}
