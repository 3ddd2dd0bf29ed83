pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod products;
pub mod promos;
pub mod webhooks;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::notifications::Notifier;
use crate::payment_provider::CheckoutProvider;
use crate::services::{
    CartService, OrderService, PaymentService, PricingEngine, ProductCatalogService, PromoService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductCatalogService>,
    pub carts: Arc<CartService>,
    pub promos: Arc<PromoService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        provider: Option<Arc<dyn CheckoutProvider>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let pricing = PricingEngine::new(config.shipping.clone(), config.charm_price);

        let products = Arc::new(ProductCatalogService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let carts = Arc::new(CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            products.clone(),
            pricing.clone(),
        ));
        let promos = Arc::new(PromoService::new(db_pool.clone()));
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            pricing,
            promos.clone(),
            products.clone(),
            notifier.clone(),
            config.vendor_email.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db_pool,
            event_sender,
            provider,
            products.clone(),
            notifier,
            config.currency.clone(),
            config.checkout.success_url.clone(),
            config.checkout.cancel_url.clone(),
            config.checkout.webhook_secret.clone(),
            config.checkout.webhook_tolerance_secs,
            config.vendor_email.clone(),
        ));

        Self {
            products,
            carts,
            promos,
            orders,
            payments,
        }
    }
}
