pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod payment_transaction;
pub mod product;
pub mod promo_code;

// Re-export entities
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus, PaymentStatus, ShippingZone};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment_transaction::{
    Entity as PaymentTransaction, Model as PaymentTransactionModel, TransactionStatus,
};
pub use product::{Entity as Product, Model as ProductModel};
pub use promo_code::{Entity as PromoCode, Model as PromoCodeModel, PromoKind, PromoScope};
