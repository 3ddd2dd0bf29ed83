use crate::{
    entities::{promo_code, PromoCode, PromoCodeModel, PromoKind, PromoScope},
    errors::{PromoError, ServiceError},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A validated code and the discount it grants for a given cart.
#[derive(Debug, Clone, Serialize)]
pub struct PromoQuote {
    pub code: String,
    pub discount: Decimal,
}

/// What the validator knows about the cart being priced.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    /// Pre-discount subtotal
    pub subtotal: Decimal,
    pub product_ids: Vec<Uuid>,
    /// Categories of the cart's products, for category-scoped codes
    pub categories: Vec<String>,
}

/// Promo-code eligibility rules and the atomic use-counter redemption.
#[derive(Clone)]
pub struct PromoService {
    db: Arc<DatabaseConnection>,
}

impl PromoService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a code against a cart snapshot and computes its discount.
    ///
    /// The checks short-circuit in a fixed order, each with its own error
    /// kind: existence/active, validity window, minimum order amount, use
    /// cap, scope applicability.
    pub async fn validate(
        &self,
        code: &str,
        cart: &CartSnapshot,
    ) -> Result<PromoQuote, ServiceError> {
        self.validate_on(&*self.db, code, cart).await
    }

    /// Same as [`validate`](Self::validate), but running on a caller-supplied
    /// connection so order creation can validate inside its transaction.
    pub async fn validate_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        cart: &CartSnapshot,
    ) -> Result<PromoQuote, ServiceError> {
        let normalized = normalize_code(code);

        let promo = PromoCode::find()
            .filter(promo_code::Column::Code.eq(normalized.clone()))
            .one(conn)
            .await?
            .ok_or(PromoError::NotFound)?;

        check_eligibility(&promo, cart, Utc::now())?;

        let discount = discount_amount(&promo, cart.subtotal);
        debug!(code = %normalized, %discount, "promo code validated");

        Ok(PromoQuote {
            code: normalized,
            discount,
        })
    }

    /// Consumes one use of a code with a single conditional increment.
    ///
    /// The `current_uses < max_uses` check and the increment are one atomic
    /// UPDATE; two concurrent orders racing on the last use cannot both
    /// succeed. Zero rows affected means the cap was hit (or the code was
    /// deactivated) between validation and redemption.
    pub async fn redeem_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
    ) -> Result<(), ServiceError> {
        let normalized = normalize_code(code);

        let result = PromoCode::update_many()
            .col_expr(
                promo_code::Column::CurrentUses,
                Expr::col(promo_code::Column::CurrentUses).add(1),
            )
            .col_expr(promo_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(promo_code::Column::Code.eq(normalized.clone()))
            .filter(promo_code::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(promo_code::Column::MaxUses.is_null())
                    .add(
                        Expr::col(promo_code::Column::CurrentUses)
                            .lt(Expr::col(promo_code::Column::MaxUses)),
                    ),
            )
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(code = %normalized, "promo redemption lost the race or cap reached");
            return Err(PromoError::Exhausted.into());
        }

        Ok(())
    }

    /// Creates a promo code. The code is stored uppercased; duplicates are
    /// rejected with a Conflict.
    #[instrument(skip(self, input))]
    pub async fn create_promo(
        &self,
        input: CreatePromoInput,
    ) -> Result<PromoCodeModel, ServiceError> {
        let code = normalize_code(&input.code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Promo code cannot be empty".to_string(),
            ));
        }
        if input.value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount value must be positive".to_string(),
            ));
        }
        if input.kind == PromoKind::Percentage && input.value > Decimal::from(100) {
            return Err(ServiceError::ValidationError(
                "Percentage discount cannot exceed 100".to_string(),
            ));
        }

        let existing = PromoCode::find()
            .filter(promo_code::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Promo code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let promo = promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            kind: Set(input.kind),
            value: Set(input.value),
            scope: Set(input.scope),
            product_ids: Set(input
                .product_ids
                .filter(|ids| !ids.is_empty())
                .map(|ids| serde_json::json!(ids))),
            category: Set(input.category),
            min_order_amount: Set(input.min_order_amount.unwrap_or(Decimal::ZERO)),
            max_uses: Set(input.max_uses),
            current_uses: Set(0),
            valid_from: Set(input.valid_from.unwrap_or(now)),
            valid_until: Set(input.valid_until),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let promo = promo.insert(&*self.db).await?;
        info!(code = %code, "Created promo code");
        Ok(promo)
    }

    pub async fn list_promos(&self) -> Result<Vec<PromoCodeModel>, ServiceError> {
        Ok(PromoCode::find()
            .order_by_desc(promo_code::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}

/// Uppercases and trims a code for storage and case-insensitive matching.
fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Runs the eligibility sequence; first failure wins.
fn check_eligibility(
    promo: &PromoCodeModel,
    cart: &CartSnapshot,
    now: DateTime<Utc>,
) -> Result<(), PromoError> {
    // 1. Exists and active
    if !promo.is_active {
        return Err(PromoError::NotFound);
    }

    // 2. Validity window; no valid_until means unbounded
    if now < promo.valid_from {
        return Err(PromoError::Expired);
    }
    if let Some(until) = promo.valid_until {
        if now > until {
            return Err(PromoError::Expired);
        }
    }

    // 3. Minimum order amount
    if cart.subtotal < promo.min_order_amount {
        return Err(PromoError::BelowMinimum(promo.min_order_amount));
    }

    // 4. Use cap
    if let Some(max_uses) = promo.max_uses {
        if promo.current_uses >= max_uses {
            return Err(PromoError::Exhausted);
        }
    }

    // 5. Scope applicability
    match promo.scope {
        PromoScope::All => {}
        PromoScope::Products => {
            let eligible: HashSet<Uuid> = promo.scoped_product_ids().into_iter().collect();
            if !cart.product_ids.iter().any(|id| eligible.contains(id)) {
                return Err(PromoError::NotApplicable);
            }
        }
        PromoScope::Category => {
            let category = promo.category.as_deref().unwrap_or_default();
            if !cart
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category))
            {
                return Err(PromoError::NotApplicable);
            }
        }
    }

    Ok(())
}

/// Discount granted by a promo for a subtotal, rounded to 2 decimal places.
/// Fixed discounts clamp at the subtotal so the total never goes negative.
pub fn discount_amount(promo: &PromoCodeModel, subtotal: Decimal) -> Decimal {
    let discount = match promo.kind {
        PromoKind::Percentage => subtotal * promo.value / Decimal::from(100),
        PromoKind::Fixed => promo.value.min(subtotal),
    };

    discount.max(Decimal::ZERO).round_dp(2)
}

/// Input for creating a promo code
#[derive(Debug, Deserialize)]
pub struct CreatePromoInput {
    pub code: String,
    pub kind: PromoKind,
    pub value: Decimal,
    #[serde(default = "default_scope")]
    pub scope: PromoScope,
    #[serde(default)]
    pub product_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_order_amount: Option<Decimal>,
    #[serde(default)]
    pub max_uses: Option<i32>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

fn default_scope() -> PromoScope {
    PromoScope::All
}
