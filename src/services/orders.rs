use crate::{
    entities::{
        order, order_item, CartItem, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus,
        PaymentStatus, ShippingZone,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{notify_or_log, Notifier},
    services::pricing::{PricingEngine, PricingLine},
    services::products::ProductCatalogService,
    services::promos::{CartSnapshot, PromoService},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Assembles cart lines, pricing, and promo validation into a persisted
/// order, then clears the cart and notifies customer and vendor.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    pricing: PricingEngine,
    promos: Arc<PromoService>,
    catalog: Arc<ProductCatalogService>,
    notifier: Arc<dyn Notifier>,
    vendor_email: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        pricing: PricingEngine,
        promos: Arc<PromoService>,
        catalog: Arc<ProductCatalogService>,
        notifier: Arc<dyn Notifier>,
        vendor_email: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            pricing,
            promos,
            catalog,
            notifier,
            vendor_email,
        }
    }

    /// Creates an order from the session's cart.
    ///
    /// Pricing and the promo discount are always recomputed server-side.
    /// An invalid or expired promo code does NOT fail the order: it is
    /// logged and the order proceeds without a discount. The promo
    /// use-counter increments inside the same transaction that persists the
    /// order, so a placed order consumes exactly one use.
    #[instrument(skip(self, input), fields(session_id = %input.session_id))]
    pub async fn create_order(
        &self,
        input: CreateOrderInput,
    ) -> Result<OrderWithItems, ServiceError> {
        let zone = ShippingZone::parse_lenient(&input.shipping_zone);

        let txn = self.db.begin().await?;

        let cart_lines = CartItem::find()
            .filter(crate::entities::cart_item::Column::SessionId.eq(input.session_id.clone()))
            .all(&txn)
            .await?;

        if cart_lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let pricing_lines: Vec<PricingLine> = cart_lines
            .iter()
            .map(|item| PricingLine {
                unit_price: item.unit_price,
                quantity: item.quantity,
                with_charm: item.with_charm,
            })
            .collect();

        let subtotal = self.pricing.subtotal(&pricing_lines)?;

        // Soft-fail promo policy: a bad code never blocks order creation.
        let (applied_code, discount) = match &input.promo_code {
            Some(code) if !code.trim().is_empty() => {
                let product_ids: Vec<Uuid> =
                    cart_lines.iter().map(|item| item.product_id).collect();
                let categories = self.catalog.categories_of(&txn, &product_ids).await?;
                let snapshot = CartSnapshot {
                    subtotal,
                    product_ids,
                    categories,
                };

                match self.promos.validate_on(&txn, code, &snapshot).await {
                    Ok(quote) => match self.promos.redeem_on(&txn, &quote.code).await {
                        Ok(()) => (Some(quote.code), quote.discount),
                        Err(e) => {
                            warn!(code = %code, "promo redemption failed, order proceeds undiscounted: {}", e);
                            (None, Decimal::ZERO)
                        }
                    },
                    Err(e) => {
                        warn!(code = %code, "promo code rejected, order proceeds undiscounted: {}", e);
                        (None, Decimal::ZERO)
                    }
                }
            }
            _ => (None, Decimal::ZERO),
        };

        let breakdown = self.pricing.quote(&pricing_lines, zone, discount)?;

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            customer_name: Set(input.customer_name),
            customer_email: Set(input.customer_email.clone()),
            customer_phone: Set(input.customer_phone),
            shipping_address: Set(input.shipping_address),
            shipping_zone: Set(zone),
            subtotal: Set(breakdown.subtotal),
            promo_code: Set(applied_code.clone()),
            discount: Set(breakdown.discount),
            shipping_cost: Set(breakdown.shipping_cost),
            total: Set(breakdown.total),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            checkout_session_id: Set(None),
            tracking_number: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(cart_lines.len());
        for line in &cart_lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                with_charm: Set(line.with_charm),
                line_total: Set(line.line_total),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        // The cart is consumed by the order
        CartItem::delete_many()
            .filter(crate::entities::cart_item::Column::SessionId.eq(input.session_id.clone()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        if let Some(code) = &applied_code {
            self.event_sender
                .send_or_log(Event::PromoRedeemed {
                    code: code.clone(),
                    order_id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        self.send_confirmation_emails(&order_model, &items).await;

        info!(%order_id, total = %order_model.total, "Order created");
        Ok(OrderWithItems {
            order: order_model,
            items,
        })
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    /// Admin-driven status transition. Transitions are monotonic; `paid` is
    /// owned by the payment reconciler and rejected here.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: &str,
    ) -> Result<OrderModel, ServiceError> {
        let target = OrderStatus::from_str(new_status)
            .map_err(|_| ServiceError::InvalidStatus(format!("Unknown status: {}", new_status)))?;

        if target == OrderStatus::Paid {
            return Err(ServiceError::InvalidStatus(
                "paid is set by payment confirmation, not by status update".to_string(),
            ));
        }

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let current = order.status;
        if !current.can_transition_to(target) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move order from {} to {}",
                current, target
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(target);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        if target == OrderStatus::Cancelled {
            self.event_sender
                .send_or_log(Event::OrderCancelled(order_id))
                .await;
        } else {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: current.to_string(),
                    new_status: target.to_string(),
                })
                .await;
        }

        info!(%order_id, from = %current, to = %target, "Order status updated");
        Ok(updated)
    }

    /// Records the carrier tracking number for a shipped order.
    #[instrument(skip(self))]
    pub async fn set_tracking(
        &self,
        order_id: Uuid,
        tracking_number: String,
    ) -> Result<OrderModel, ServiceError> {
        if tracking_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Tracking number cannot be empty".to_string(),
            ));
        }

        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(
                "Cannot set tracking on a cancelled order".to_string(),
            ));
        }

        let mut active: order::ActiveModel = order.into();
        active.tracking_number = Set(Some(tracking_number));
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    async fn send_confirmation_emails(&self, order: &OrderModel, items: &[OrderItemModel]) {
        let customer_body = format!(
            "Hello {},\n\n\
             Thank you for your order!\n\n\
             Order summary:\n\
             - Order number: {}\n\
             - Subtotal: {:.2}\n\
             - Discount: {:.2}\n\
             - Shipping: {:.2}\n\
             - Total: {:.2}\n\n\
             Your order will be prepared with care and shipped within 2-3 business days.\n\
             Payment reference: {}\n",
            order.customer_name,
            order.id,
            order.subtotal,
            order.discount,
            order.shipping_cost,
            order.total,
            order.id,
        );

        let item_lines: Vec<String> = items
            .iter()
            .map(|item| {
                format!(
                    "- {} x{} ({:.2}){}",
                    item.product_name,
                    item.quantity,
                    item.unit_price,
                    if item.with_charm { " + charm" } else { "" }
                )
            })
            .collect();

        let vendor_body = format!(
            "New order received:\n\n\
             Customer: {}\n\
             Email: {}\n\
             Phone: {}\n\
             Address: {}\n\
             Zone: {:?}\n\n\
             Total: {:.2}\n\n\
             Items:\n{}\n",
            order.customer_name,
            order.customer_email,
            order.customer_phone,
            order.shipping_address,
            order.shipping_zone,
            order.total,
            item_lines.join("\n"),
        );

        notify_or_log(
            self.notifier.as_ref(),
            &order.customer_email,
            "Your order confirmation",
            &customer_body,
        )
        .await;

        notify_or_log(
            self.notifier.as_ref(),
            &self.vendor_email,
            &format!("New order - {}", order.id),
            &vendor_body,
        )
        .await;
    }
}

/// Input for creating an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub session_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub shipping_zone: String,
    #[serde(default)]
    pub promo_code: Option<String>,
}

/// Order with its item snapshot
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}
