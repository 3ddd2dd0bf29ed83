use crate::{
    entities::{product, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Product catalog: lookups for the storefront and pricing core, plus the
/// admin CRUD surface and the atomic stock adjustment used by fulfillment.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Looks up a product by id.
    pub async fn find_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Active products for the storefront, newest first.
    pub async fn list_active(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Product price cannot be negative".to_string(),
            ));
        }
        if input.stock < 0 {
            return Err(ServiceError::ValidationError(
                "Product stock cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            image_url: Set(input.image_url),
            category: Set(input.category),
            stock: Set(input.stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = product.insert(&*self.db).await?;
        info!(product_id = %product.id, "Created product {}", product.name);
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let product = self.find_product(product_id).await?;
        let mut active: product::ActiveModel = product.into();

        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Product price cannot be negative".to_string(),
                ));
            }
            active.price = Set(price);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(image_url);
        }
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(stock) = input.stock {
            if stock < 0 {
                return Err(ServiceError::ValidationError(
                    "Product stock cannot be negative".to_string(),
                ));
            }
            active.stock = Set(stock);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let result = Product::delete_by_id(product_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }
        info!(%product_id, "Deleted product");
        Ok(())
    }

    /// Adjusts stock by `delta` as a single UPDATE expression.
    ///
    /// Best-effort by design: the decrement is not blocked when stock would
    /// go negative, so a paid order always fulfills.
    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, product_id: Uuid, delta: i32) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(delta),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(%product_id, "Stock adjustment targeted a missing product");
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        self.event_sender
            .send_or_log(Event::StockAdjusted { product_id, delta })
            .await;

        Ok(())
    }

    /// Seeds the initial collection when the catalog is empty.
    pub async fn seed_initial_catalog(&self) -> Result<(), ServiceError> {
        let existing = Product::find().count(&*self.db).await?;
        if existing > 0 {
            return Ok(());
        }

        let seeds = [
            (
                "Sand",
                "Elegant natural beige bag, handwoven with golden details.",
                Decimal::new(8900, 2),
                "bag",
            ),
            (
                "Sunny",
                "Vibrant yellow and white bag inspired by mediterranean sunshine.",
                Decimal::new(9500, 2),
                "bag",
            ),
            (
                "Teddy Bear",
                "Protective laptop sleeve woven in natural tones.",
                Decimal::new(6500, 2),
                "sleeve",
            ),
            (
                "Classy",
                "Sophisticated black and beige bag blending modern elegance with traditional craft.",
                Decimal::new(12000, 2),
                "bag",
            ),
        ];

        let now = Utc::now();
        for (name, description, price, category) in seeds {
            let product = product::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name.to_string()),
                description: Set(description.to_string()),
                price: Set(price),
                image_url: Set(format!(
                    "https://assets.boutique.example/products/{}.png",
                    name.to_lowercase().replace(' ', "-")
                )),
                category: Set(category.to_string()),
                stock: Set(10),
                is_active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
            };
            product.insert(&*self.db).await?;
        }

        info!("Seeded initial catalog");
        Ok(())
    }

    /// Categories of the given products, used for category-scoped promos.
    pub async fn categories_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_ids: &[Uuid],
    ) -> Result<Vec<String>, ServiceError> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let products = Product::find()
            .filter(product::Column::Id.is_in(product_ids.iter().copied()))
            .all(conn)
            .await?;

        Ok(products.into_iter().map(|p| p.category).collect())
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image_url: String,
    pub category: String,
    #[serde(default)]
    pub stock: i32,
}

/// Input for updating a product; unset fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}
