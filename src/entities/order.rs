use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A placed order with its pricing breakdown.
///
/// `total` is always recomputed server-side as
/// `subtotal - discount + shipping_cost`; client-supplied totals are never
/// trusted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[sea_orm(column_type = "Text")]
    pub shipping_address: String,
    pub shipping_zone: ShippingZone,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(nullable)]
    pub promo_code: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shipping_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[sea_orm(nullable)]
    pub checkout_session_id: Option<String>,
    #[sea_orm(nullable)]
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Shipping destination category driving shipping cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ShippingZone {
    #[sea_orm(string_value = "domestic")]
    Domestic,
    #[sea_orm(string_value = "regional")]
    Regional,
    #[sea_orm(string_value = "international")]
    International,
}

impl ShippingZone {
    /// Parses a zone name case-insensitively. Unknown values fall back to
    /// International, the most expensive rate, rather than erroring.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "domestic" => Self::Domestic,
            "regional" => Self::Regional,
            _ => Self::International,
        }
    }
}

/// Order lifecycle status. Transitions are monotonic; `cancelled` is
/// terminal and reachable only before payment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Paid => 1,
            Self::Shipped => 2,
            Self::Delivered => 3,
            Self::Cancelled => 4,
        }
    }

    /// Whether the order may move from `self` to `next`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        match (self, next) {
            // Cancellation only before payment
            (Self::Pending, Self::Cancelled) => true,
            (_, Self::Cancelled) => false,
            // Terminal states never regress
            (Self::Cancelled, _) | (Self::Delivered, _) => false,
            // Forward-only otherwise
            (current, next) => next.rank() > current.rank(),
        }
    }
}

/// Payment state of the order as a whole.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_parsing_falls_back_to_international() {
        assert_eq!(
            ShippingZone::parse_lenient("Domestic"),
            ShippingZone::Domestic
        );
        assert_eq!(
            ShippingZone::parse_lenient("REGIONAL"),
            ShippingZone::Regional
        );
        assert_eq!(
            ShippingZone::parse_lenient("mars"),
            ShippingZone::International
        );
        assert_eq!(ShippingZone::parse_lenient(""), ShippingZone::International);
    }

    #[test]
    fn status_transitions_are_monotonic() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Cancelled));

        assert!(!Paid.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Paid));
        assert!(!Delivered.can_transition_to(Shipped));
    }

    #[test]
    fn cancellation_is_blocked_after_payment() {
        use OrderStatus::*;

        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Paid));
    }
}
