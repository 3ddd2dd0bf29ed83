use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discount voucher with eligibility rules and a use cap.
///
/// Codes are stored uppercased and matched case-insensitively.
/// Invariant: `current_uses <= max_uses` whenever `max_uses` is set;
/// the redemption path enforces this with a conditional increment.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub code: String,
    pub kind: PromoKind,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub value: Decimal,
    pub scope: PromoScope,
    /// Product ids the code applies to when scope = products
    #[sea_orm(column_type = "Json", nullable)]
    pub product_ids: Option<Json>,
    /// Category the code applies to when scope = category
    #[sea_orm(nullable)]
    pub category: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub min_order_amount: Decimal,
    #[sea_orm(nullable)]
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub valid_from: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Discount computation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PromoKind {
    /// value is a percentage of the subtotal
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// value is a fixed amount, clamped to the subtotal
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Which cart contents a code is eligible for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PromoScope {
    #[sea_orm(string_value = "all")]
    All,
    #[sea_orm(string_value = "products")]
    Products,
    #[sea_orm(string_value = "category")]
    Category,
}

impl Model {
    /// Product ids for scope = products, decoded from the JSON column.
    pub fn scoped_product_ids(&self) -> Vec<Uuid> {
        self.product_ids
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}
