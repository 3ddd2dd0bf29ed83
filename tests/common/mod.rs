#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use boutique_api::{
    config::AppConfig,
    db,
    entities::ProductModel,
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    notifications::{NotificationError, Notifier},
    payment_provider::{
        sign_webhook_payload, CheckoutProvider, CheckoutSessionInfo, ProviderSessionStatus,
    },
    services::products::CreateProductInput,
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test";

/// In-memory stand-in for the hosted checkout provider.
///
/// Tests flip a session's payment state with `mark_paid`/`mark_failed` and
/// then drive the reconciler through polls or signed webhooks.
pub struct FakeCheckoutProvider {
    sessions: Mutex<HashMap<String, ProviderSessionStatus>>,
    counter: AtomicU32,
    fail_next: AtomicBool,
}

impl FakeCheckoutProvider {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            counter: AtomicU32::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Makes the next provider call fail like a network outage.
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(status) = sessions.get_mut(session_id) {
            status.status = "complete".to_string();
            status.payment_status = "paid".to_string();
        }
    }

    pub fn mark_failed(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(status) = sessions.get_mut(session_id) {
            status.status = "expired".to_string();
            status.payment_status = "failed".to_string();
        }
    }

    fn take_failure(&self) -> bool {
        self.fail_next.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckoutProvider {
    async fn create_session(
        &self,
        amount: Decimal,
        currency: &str,
        _success_url: &str,
        _cancel_url: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<CheckoutSessionInfo, ServiceError> {
        if self.take_failure() {
            return Err(ServiceError::ExternalServiceError(
                "provider request failed: connection reset".to_string(),
            ));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("cs_test_{:04}", n);

        self.sessions.lock().unwrap().insert(
            session_id.clone(),
            ProviderSessionStatus {
                status: "open".to_string(),
                payment_status: "unpaid".to_string(),
                amount_total: amount,
                currency: currency.to_string(),
            },
        );

        Ok(CheckoutSessionInfo {
            url: format!("https://checkout.example/pay/{}", session_id),
            session_id,
        })
    }

    async fn get_status(&self, session_id: &str) -> Result<ProviderSessionStatus, ServiceError> {
        if self.take_failure() {
            return Err(ServiceError::ExternalServiceError(
                "provider request failed: timeout".to_string(),
            ));
        }

        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Checkout session {} not found at provider",
                    session_id
                ))
            })
    }
}

/// Records every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<SentMail>>,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipient: String,
    pub subject: String,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
        });
        Ok(())
    }
}

/// Test application backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<FakeCheckoutProvider>,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// Same harness, but with no payment provider configured; checkout
    /// endpoints answer 503.
    pub async fn new_without_provider() -> Self {
        Self::build(false).await
    }

    async fn build(with_provider: bool) -> Self {
        let cfg = AppConfig::for_tests("sqlite::memory:".to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let provider = Arc::new(FakeCheckoutProvider::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            &cfg,
            with_provider.then(|| provider.clone() as Arc<dyn CheckoutProvider>),
            notifier.clone() as Arc<dyn Notifier>,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", boutique_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            provider,
            notifier,
            _event_task: event_task,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Deliver a signed webhook to the payment endpoint. Returns the
    /// response status.
    pub async fn deliver_webhook(&self, payload: &Value) -> StatusCode {
        let body = serde_json::to_vec(payload).unwrap();
        let signature =
            sign_webhook_payload(&body, WEBHOOK_SECRET, chrono::Utc::now().timestamp());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("signature", signature)
            .body(Body::from(body))
            .expect("failed to build webhook request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook delivery")
            .status()
    }

    /// Deliver a raw webhook body with an explicit signature header.
    /// Returns the response status.
    pub async fn request_raw_webhook(&self, body: &[u8], signature: &str) -> StatusCode {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("signature", signature)
            .body(Body::from(body.to_vec()))
            .expect("failed to build webhook request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook delivery")
            .status()
    }

    /// Read a response body as JSON.
    pub async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        serde_json::from_slice(&bytes).expect("response body was not valid json")
    }

    /// Seed one catalog product.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductModel {
        self.state
            .services
            .products
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: format!("Test product {}", name),
                price,
                image_url: format!(
                    "https://assets.boutique.example/test/{}.png",
                    name.to_lowercase()
                ),
                category: "bag".to_string(),
                stock,
            })
            .await
            .expect("seed product for tests")
    }

    /// Number of notifications recorded so far.
    pub fn sent_mail_count(&self) -> usize {
        self.notifier.sent.lock().unwrap().len()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// A signed "checkout.session.completed" webhook payload for a session.
pub fn completed_webhook_payload(session_id: &str, payment_status: &str) -> Value {
    serde_json::json!({
        "id": format!("evt_{}", session_id),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "payment_status": payment_status,
            }
        }
    })
}
