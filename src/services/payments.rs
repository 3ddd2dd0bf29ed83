use crate::{
    entities::{
        order, order_item, payment_transaction, Order, OrderItem, OrderStatus, PaymentStatus,
        PaymentTransaction, PaymentTransactionModel, TransactionStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{notify_or_log, Notifier},
    payment_provider::{verify_and_parse_webhook, CheckoutProvider, CheckoutSessionInfo},
    services::products::ProductCatalogService,
};
use axum::http::HeaderMap;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Provider payment outcome, normalized from poll responses and webhook
/// events so both paths drive the same transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Paid,
    Failed,
    Pending,
}

/// Reconciliation view returned to the storefront's status poll.
#[derive(Debug, Serialize)]
pub struct PaymentStatusView {
    pub session_id: String,
    pub order_id: Uuid,
    pub status: TransactionStatus,
    pub provider_status: Option<String>,
    pub amount: Decimal,
    pub currency: String,
}

/// Drives an order's payment transaction through session creation, status
/// polls and webhook deliveries, and runs fulfillment exactly once.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    provider: Option<Arc<dyn CheckoutProvider>>,
    catalog: Arc<ProductCatalogService>,
    notifier: Arc<dyn Notifier>,
    currency: String,
    success_url: String,
    cancel_url: String,
    webhook_secret: Option<String>,
    webhook_tolerance_secs: u64,
    vendor_email: String,
}

impl PaymentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        provider: Option<Arc<dyn CheckoutProvider>>,
        catalog: Arc<ProductCatalogService>,
        notifier: Arc<dyn Notifier>,
        currency: String,
        success_url: String,
        cancel_url: String,
        webhook_secret: Option<String>,
        webhook_tolerance_secs: u64,
        vendor_email: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            provider,
            catalog,
            notifier,
            currency,
            success_url,
            cancel_url,
            webhook_secret,
            webhook_tolerance_secs,
            vendor_email,
        }
    }

    fn provider(&self) -> Result<&Arc<dyn CheckoutProvider>, ServiceError> {
        self.provider.as_ref().ok_or_else(|| {
            ServiceError::ProviderUnavailable("payment provider is not configured".to_string())
        })
    }

    /// Creates a hosted checkout session for an order's total.
    ///
    /// A retried checkout creates a fresh transaction; earlier sessions stay
    /// on record and simply never reach `paid`.
    #[instrument(skip(self))]
    pub async fn start_checkout(
        &self,
        order_id: Uuid,
    ) -> Result<CheckoutSessionInfo, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(
                "Order is already paid".to_string(),
            ));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(
                "Order is cancelled".to_string(),
            ));
        }

        let provider = self.provider()?;

        let mut metadata = HashMap::new();
        metadata.insert("order_id".to_string(), order_id.to_string());

        let session = provider
            .create_session(
                order.total,
                &self.currency,
                &self.success_url,
                &self.cancel_url,
                metadata,
            )
            .await?;

        let now = Utc::now();
        payment_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session.session_id.clone()),
            order_id: Set(order_id),
            amount: Set(order.total),
            currency: Set(self.currency.clone()),
            status: Set(TransactionStatus::SessionCreated),
            provider_status: Set(None),
            metadata: Set(Some(serde_json::json!({ "order_id": order_id }))),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        let mut active: order::ActiveModel = order.into();
        active.checkout_session_id = Set(Some(session.session_id.clone()));
        active.updated_at = Set(now);
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                order_id,
                session_id: session.session_id.clone(),
            })
            .await;

        info!(%order_id, session_id = %session.session_id, "Checkout session created");
        Ok(session)
    }

    /// Queries the provider for a session's state and reconciles it.
    ///
    /// Terminal transactions are returned as stored without another
    /// provider round-trip.
    #[instrument(skip(self))]
    pub async fn poll_status(&self, session_id: &str) -> Result<PaymentStatusView, ServiceError> {
        let transaction = self.find_transaction(session_id).await?;

        if transaction.status.is_terminal() {
            return Ok(Self::view_of(transaction));
        }

        let provider = self.provider()?;
        let status = provider.get_status(session_id).await?;

        let outcome = if status.is_paid() {
            ProviderOutcome::Paid
        } else if status.is_failed() {
            ProviderOutcome::Failed
        } else {
            ProviderOutcome::Pending
        };

        self.apply_provider_status(session_id, outcome, Some(status.payment_status.clone()))
            .await?;

        let refreshed = self.find_transaction(session_id).await?;
        Ok(Self::view_of(refreshed))
    }

    /// Verifies and ingests a provider webhook.
    ///
    /// Signature failures are rejected outright; no retry semantics, no
    /// fulfillment. A valid "checkout.session.completed" event feeds the
    /// same transition as the status poll, so duplicate deliveries and
    /// poll/webhook races fulfill at most once.
    #[instrument(skip(self, headers, body))]
    pub async fn handle_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), ServiceError> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::ProviderUnavailable("webhook secret is not configured".to_string())
        })?;

        let event = verify_and_parse_webhook(headers, body, secret, self.webhook_tolerance_secs)?;

        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session_id = event.session_id().ok_or_else(|| {
                    ServiceError::ValidationError("webhook event carries no session id".to_string())
                })?;

                let provider_status = event.payment_status().map(|s| s.to_string());
                let outcome = match event.payment_status() {
                    Some(s) if s.eq_ignore_ascii_case("paid") => ProviderOutcome::Paid,
                    Some(s) if s.eq_ignore_ascii_case("failed") => ProviderOutcome::Failed,
                    _ => ProviderOutcome::Pending,
                };

                self.apply_provider_status(session_id, outcome, provider_status)
                    .await?;
            }
            "checkout.session.expired" => {
                if let Some(session_id) = event.session_id() {
                    self.apply_provider_status(
                        session_id,
                        ProviderOutcome::Failed,
                        Some("expired".to_string()),
                    )
                    .await?;
                }
            }
            other => {
                info!(event_type = %other, "Ignoring unhandled webhook event type");
            }
        }

        Ok(())
    }

    /// The single transition both poll and webhook converge on.
    ///
    /// A `Paid` outcome flips the transaction with an atomic
    /// update-if-not-already-paid; only the caller that wins that write runs
    /// fulfillment. Terminal rows are never regressed.
    pub async fn apply_provider_status(
        &self,
        session_id: &str,
        outcome: ProviderOutcome,
        provider_status: Option<String>,
    ) -> Result<(), ServiceError> {
        let transaction = self.find_transaction(session_id).await?;

        match outcome {
            ProviderOutcome::Paid => {
                let mut paid = <payment_transaction::ActiveModel as sea_orm::ActiveModelTrait>::default();
                paid.status = Set(TransactionStatus::Paid);
                paid.provider_status = Set(provider_status);
                paid.updated_at = Set(Utc::now());

                // Idempotence guard: the status check and write are one
                // conditional UPDATE, so duplicate deliveries and
                // poll/webhook races cannot fulfill twice.
                let result = PaymentTransaction::update_many()
                    .set(paid)
                    .filter(payment_transaction::Column::SessionId.eq(session_id))
                    .filter(payment_transaction::Column::Status.ne(TransactionStatus::Paid))
                    .exec(&*self.db)
                    .await?;

                if result.rows_affected == 0 {
                    info!(%session_id, "Session already reconciled as paid; skipping fulfillment");
                    return Ok(());
                }

                self.fulfill_order(&transaction).await?;
            }
            ProviderOutcome::Failed => {
                let mut failed = <payment_transaction::ActiveModel as sea_orm::ActiveModelTrait>::default();
                failed.status = Set(TransactionStatus::Failed);
                failed.provider_status = Set(provider_status);
                failed.updated_at = Set(Utc::now());

                let result = PaymentTransaction::update_many()
                    .set(failed)
                    .filter(payment_transaction::Column::SessionId.eq(session_id))
                    .filter(payment_transaction::Column::Status.ne(TransactionStatus::Paid))
                    .filter(payment_transaction::Column::Status.ne(TransactionStatus::Failed))
                    .exec(&*self.db)
                    .await?;

                if result.rows_affected > 0 {
                    self.mark_order_payment_failed(transaction.order_id).await?;
                    self.event_sender
                        .send_or_log(Event::PaymentFailed {
                            order_id: transaction.order_id,
                            session_id: session_id.to_string(),
                        })
                        .await;
                }
            }
            ProviderOutcome::Pending => {
                if transaction.status == TransactionStatus::SessionCreated {
                    let mut awaiting: payment_transaction::ActiveModel = transaction.into();
                    awaiting.status = Set(TransactionStatus::AwaitingConfirmation);
                    awaiting.provider_status = Set(provider_status);
                    awaiting.updated_at = Set(Utc::now());
                    awaiting.update(&*self.db).await?;
                }
            }
        }

        Ok(())
    }

    /// Fulfillment side effects, run exactly once per paid session: order
    /// flips to paid, stock is decremented per line, customer and vendor
    /// are notified.
    async fn fulfill_order(
        &self,
        transaction: &PaymentTransactionModel,
    ) -> Result<(), ServiceError> {
        let order_id = transaction.order_id;

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let customer_email = order.customer_email.clone();
        let customer_name = order.customer_name.clone();
        let total = order.total;

        // An order with several checkout attempts still pays out once: the
        // order flip carries the same not-already-paid condition as the
        // transaction flip.
        let mut paid = <order::ActiveModel as sea_orm::ActiveModelTrait>::default();
        paid.status = Set(OrderStatus::Paid);
        paid.payment_status = Set(PaymentStatus::Paid);
        paid.updated_at = Set(Utc::now());

        let result = Order::update_many()
            .set(paid)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::Paid))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(%order_id, "Order already paid through another session; skipping fulfillment");
            return Ok(());
        }

        // Best-effort decrement: a paid order always fulfills, even if stock
        // bookkeeping has drifted.
        for item in &items {
            if let Err(e) = self
                .catalog
                .adjust_stock(item.product_id, -item.quantity)
                .await
            {
                warn!(
                    product_id = %item.product_id,
                    "stock decrement failed during fulfillment: {}", e
                );
            }
        }

        let customer_body = format!(
            "Hello {},\n\n\
             We received your payment of {:.2}. Your order {} is confirmed\n\
             and will ship shortly.\n",
            customer_name, total, order_id,
        );
        notify_or_log(
            self.notifier.as_ref(),
            &customer_email,
            "Payment received",
            &customer_body,
        )
        .await;

        let vendor_body = format!(
            "Order {} has been paid ({:.2}). Session: {}\n",
            order_id, total, transaction.session_id,
        );
        notify_or_log(
            self.notifier.as_ref(),
            &self.vendor_email,
            &format!("Order paid - {}", order_id),
            &vendor_body,
        )
        .await;

        self.event_sender
            .send_or_log(Event::OrderPaid {
                order_id,
                session_id: transaction.session_id.clone(),
            })
            .await;

        info!(%order_id, session_id = %transaction.session_id, "Order fulfilled");
        Ok(())
    }

    async fn mark_order_payment_failed(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let mut failed = <order::ActiveModel as sea_orm::ActiveModelTrait>::default();
        failed.payment_status = Set(PaymentStatus::Failed);
        failed.updated_at = Set(Utc::now());

        // The order itself stays pending so checkout can be retried, and a
        // paid order is never downgraded.
        Order::update_many()
            .set(failed)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::Paid))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    async fn find_transaction(
        &self,
        session_id: &str,
    ) -> Result<PaymentTransactionModel, ServiceError> {
        PaymentTransaction::find()
            .filter(payment_transaction::Column::SessionId.eq(session_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment session {} not found", session_id))
            })
    }

    fn view_of(transaction: PaymentTransactionModel) -> PaymentStatusView {
        PaymentStatusView {
            session_id: transaction.session_id,
            order_id: transaction.order_id,
            status: transaction.status,
            provider_status: transaction.provider_status,
            amount: transaction.amount,
            currency: transaction.currency,
        }
    }
}
