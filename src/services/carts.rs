use crate::{
    entities::{cart_item, CartItem, CartItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{PricingEngine, PricingLine},
    services::products::ProductCatalogService,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Session-keyed shopping cart.
///
/// Every line belongs to an explicit `session_id`; two browsing sessions
/// never see each other's carts. Unit prices are snapshotted from the
/// catalog at add time.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: Arc<ProductCatalogService>,
    pricing: PricingEngine,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<ProductCatalogService>,
        pricing: PricingEngine,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            pricing,
        }
    }

    /// Adds a product to the session's cart, merging into an existing line
    /// when the same product/charm combination is already present.
    #[instrument(skip(self, input), fields(session_id = %input.session_id, product_id = %input.product_id))]
    pub async fn add_item(&self, input: AddToCartInput) -> Result<CartItemModel, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be at least 1, got {}",
                input.quantity
            )));
        }
        if input.session_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Session id is required".to_string(),
            ));
        }

        let product = self.catalog.find_product(input.product_id).await?;
        if !product.is_active {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                input.product_id
            )));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::SessionId.eq(input.session_id.clone()))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(cart_item::Column::WithCharm.eq(input.with_charm))
            .one(&*self.db)
            .await?;

        let item = if let Some(item) = existing {
            let quantity = item.quantity + input.quantity;
            let line = PricingLine {
                unit_price: item.unit_price,
                quantity,
                with_charm: item.with_charm,
            };
            let line_total = self.pricing.line_total(&line)?;

            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.line_total = Set(line_total);
            active.update(&*self.db).await?
        } else {
            let line = PricingLine {
                unit_price: product.price,
                quantity: input.quantity,
                with_charm: input.with_charm,
            };
            let line_total = self.pricing.line_total(&line)?;

            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                session_id: Set(input.session_id.clone()),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                product_image: Set(product.image_url.clone()),
                unit_price: Set(product.price),
                quantity: Set(input.quantity),
                with_charm: Set(input.with_charm),
                line_total: Set(line_total),
                added_at: Set(Utc::now()),
            };
            item.insert(&*self.db).await?
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                session_id: input.session_id.clone(),
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added to cart {}: {} x{}",
            input.session_id, product.name, input.quantity
        );
        Ok(item)
    }

    /// The session's cart lines with their pre-discount subtotal.
    pub async fn get_cart(&self, session_id: &str) -> Result<CartView, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::SessionId.eq(session_id))
            .order_by_asc(cart_item::Column::AddedAt)
            .all(&*self.db)
            .await?;

        let subtotal: Decimal = items.iter().map(|item| item.line_total).sum();

        Ok(CartView {
            session_id: session_id.to_string(),
            subtotal: subtotal.round_dp(2),
            items,
        })
    }

    /// Removes one line; the line must belong to the session.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, session_id: &str, item_id: Uuid) -> Result<(), ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.session_id != session_id {
            return Err(ServiceError::InvalidOperation(
                "Item does not belong to this cart".to_string(),
            ));
        }

        CartItem::delete_by_id(item_id).exec(&*self.db).await?;
        Ok(())
    }

    /// Empties the session's cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, session_id: &str) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::SessionId.eq(session_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartCleared {
                session_id: session_id.to_string(),
            })
            .await;

        info!("Cleared cart {}", session_id);
        Ok(())
    }
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddToCartInput {
    pub session_id: String,
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub with_charm: bool,
}

/// A cart with its lines and running subtotal
#[derive(Debug, Serialize)]
pub struct CartView {
    pub session_id: String,
    pub subtotal: Decimal,
    pub items: Vec<CartItemModel>,
}
