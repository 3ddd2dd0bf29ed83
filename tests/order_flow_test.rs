//! End-to-end tests for cart -> order assembly: pricing, shipping zones,
//! promo application, and the order status lifecycle.

mod common;

use axum::http::{Method, StatusCode};
use boutique_api::{
    entities::{OrderStatus, PaymentStatus},
    services::carts::AddToCartInput,
    services::orders::CreateOrderInput,
    services::promos::CreatePromoInput,
};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

fn order_input(session_id: &str, zone: &str, promo_code: Option<&str>) -> CreateOrderInput {
    CreateOrderInput {
        session_id: session_id.to_string(),
        customer_name: "Ada Lovelace".to_string(),
        customer_email: "ada@example.com".to_string(),
        customer_phone: "+33 6 12 34 56 78".to_string(),
        shipping_address: "1 Rue de la Paix, Marseille".to_string(),
        shipping_zone: zone.to_string(),
        promo_code: promo_code.map(|c| c.to_string()),
    }
}

async fn fill_cart(app: &TestApp, session_id: &str, price: Decimal, quantity: i32) {
    let product = app.seed_product("Sand", price, 10).await;
    app.state
        .services
        .carts
        .add_item(AddToCartInput {
            session_id: session_id.to_string(),
            product_id: product.id,
            quantity,
            with_charm: false,
        })
        .await
        .expect("add item to cart");
}

#[tokio::test]
async fn domestic_order_below_threshold_pays_flat_shipping() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    let result = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .expect("create order");

    assert_eq!(result.order.subtotal, dec!(70.00));
    assert_eq!(result.order.discount, dec!(0.00));
    assert_eq!(result.order.shipping_cost, dec!(5.00));
    assert_eq!(result.order.total, dec!(75.00));
    assert_eq!(result.order.status, OrderStatus::Pending);
    assert_eq!(result.order.payment_status, PaymentStatus::Pending);
    assert_eq!(result.items.len(), 1);
}

#[tokio::test]
async fn domestic_order_over_threshold_ships_free() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 3).await;

    let result = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .expect("create order");

    assert_eq!(result.order.subtotal, dec!(105.00));
    assert_eq!(result.order.shipping_cost, dec!(0.00));
    assert_eq!(result.order.total, dec!(105.00));
}

#[tokio::test]
async fn percentage_promo_discounts_and_can_revoke_free_shipping() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    app.state
        .services
        .promos
        .create_promo(CreatePromoInput {
            code: "WELCOME5".to_string(),
            kind: boutique_api::entities::PromoKind::Percentage,
            value: dec!(5),
            scope: boutique_api::entities::PromoScope::All,
            product_ids: None,
            category: None,
            min_order_amount: Some(dec!(30)),
            max_uses: None,
            valid_from: None,
            valid_until: None,
        })
        .await
        .expect("create promo");

    let result = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", Some("WELCOME5")))
        .await
        .expect("create order");

    // 5% of 70 = 3.50; post-discount 66.50 < 80 so shipping applies
    assert_eq!(result.order.discount, dec!(3.50));
    assert_eq!(result.order.shipping_cost, dec!(5.00));
    assert_eq!(result.order.total, dec!(71.50));
    assert_eq!(result.order.promo_code.as_deref(), Some("WELCOME5"));

    // Exactly one use consumed
    let promos = app.state.services.promos.list_promos().await.unwrap();
    assert_eq!(promos[0].current_uses, 1);
}

#[tokio::test]
async fn invalid_promo_code_is_ignored_at_order_time() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    let result = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", Some("NO-SUCH-CODE")))
        .await
        .expect("order must succeed despite bad code");

    assert_eq!(result.order.discount, dec!(0.00));
    assert_eq!(result.order.promo_code, None);
    assert_eq!(result.order.total, dec!(75.00));
}

#[tokio::test]
async fn order_consumes_the_cart() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    app.state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .expect("create order");

    let cart = app.state.services.carts.get_cart("sess-1").await.unwrap();
    assert!(cart.items.is_empty());
    assert_eq!(cart.subtotal, dec!(0.00));
}

#[tokio::test]
async fn unknown_zone_falls_back_to_international_rate() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    let result = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "narnia", None))
        .await
        .expect("create order");

    assert_eq!(result.order.shipping_cost, dec!(20.00));
    assert_eq!(result.order.total, dec!(90.00));
}

#[tokio::test]
async fn charm_addon_prices_per_unit() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sunny", dec!(35.00), 10).await;

    app.state
        .services
        .carts
        .add_item(AddToCartInput {
            session_id: "sess-1".to_string(),
            product_id: product.id,
            quantity: 2,
            with_charm: true,
        })
        .await
        .expect("add charmed item");

    let result = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .expect("create order");

    // (35 + 2 charm) * 2 = 74, shipping 5
    assert_eq!(result.order.subtotal, dec!(74.00));
    assert_eq!(result.order.total, dec!(79.00));
    assert!(result.items[0].with_charm);
}

#[tokio::test]
async fn empty_cart_cannot_become_an_order() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .orders
        .create_order(order_input("empty-sess", "domestic", None))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_creation_over_http_returns_created_with_totals() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-http", dec!(35.00), 2).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(serde_json::json!({
                "session_id": "sess-http",
                "customer_name": "Ada Lovelace",
                "customer_email": "ada@example.com",
                "customer_phone": "+33 6 12 34 56 78",
                "shipping_address": "1 Rue de la Paix, Marseille",
                "shipping_zone": "domestic"
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = TestApp::body_json(response).await;

    let total = Decimal::from_str(body["order"]["total"].as_str().unwrap()).unwrap();
    assert_eq!(total, dec!(75.00));
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn order_confirmation_notifies_customer_and_vendor() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    app.state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .expect("create order");

    let sent = app.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].recipient, "ada@example.com");
    assert_eq!(sent[1].recipient, app.state.config.vendor_email);
}

#[tokio::test]
async fn status_updates_are_monotonic_and_guard_paid() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    let order = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .unwrap()
        .order;

    // paid belongs to the reconciler
    let err = app
        .state
        .services
        .orders
        .update_status(order.id, "paid")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

    // unknown value is rejected
    let err = app
        .state
        .services
        .orders
        .update_status(order.id, "teleported")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

    // forward transition works; regression is rejected
    let updated = app
        .state
        .services
        .orders
        .update_status(order.id, "shipped")
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Shipped);

    let err = app
        .state
        .services
        .orders
        .update_status(order.id, "cancelled")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pending_order_can_be_cancelled() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    let order = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .unwrap()
        .order;

    let cancelled = app
        .state
        .services
        .orders
        .update_status(order.id, "cancelled")
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Terminal: nothing moves a cancelled order
    assert!(app
        .state
        .services
        .orders
        .update_status(order.id, "shipped")
        .await
        .is_err());
}

#[tokio::test]
async fn tracking_number_is_recorded() {
    let app = TestApp::new().await;
    fill_cart(&app, "sess-1", dec!(35.00), 2).await;

    let order = app
        .state
        .services
        .orders
        .create_order(order_input("sess-1", "domestic", None))
        .await
        .unwrap()
        .order;

    let updated = app
        .state
        .services
        .orders
        .set_tracking(order.id, "COLIS-123456".to_string())
        .await
        .unwrap();
    assert_eq!(updated.tracking_number.as_deref(), Some("COLIS-123456"));
}

#[tokio::test]
async fn cart_lines_merge_on_repeated_adds() {
    let app = TestApp::new().await;
    let product = app.seed_product("Classy", dec!(120.00), 5).await;

    for _ in 0..2 {
        app.state
            .services
            .carts
            .add_item(AddToCartInput {
                session_id: "sess-1".to_string(),
                product_id: product.id,
                quantity: 1,
                with_charm: false,
            })
            .await
            .unwrap();
    }

    let cart = app.state.services.carts.get_cart("sess-1").await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.subtotal, dec!(240.00));
}

#[tokio::test]
async fn carts_are_isolated_per_session() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sand", dec!(89.00), 5).await;

    app.state
        .services
        .carts
        .add_item(AddToCartInput {
            session_id: "alice".to_string(),
            product_id: product.id,
            quantity: 1,
            with_charm: false,
        })
        .await
        .unwrap();

    let bob_cart = app.state.services.carts.get_cart("bob").await.unwrap();
    assert!(bob_cart.items.is_empty());

    let alice_cart = app.state.services.carts.get_cart("alice").await.unwrap();
    assert_eq!(alice_cart.items.len(), 1);
}
