//! Unpaid-order reclaimer: the grace-period sweep, its idempotency and its
//! pending-payment purge side effect.

mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use glowcart_api::entities::order::{OrderStatus, PaymentMethod, PaymentStatus};
use glowcart_api::entities::pending_payment;
use glowcart_api::services::reclaimer;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

const GRACE_MINS: i64 = 60;

fn grace() -> Duration {
    Duration::minutes(GRACE_MINS)
}

fn ttl() -> Duration {
    Duration::minutes(common::PENDING_TTL_MINS)
}

#[tokio::test]
async fn stale_unpaid_gateway_order_is_reclaimed() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Face Oil", dec!(130), 7, true).await;

    // Stock was already decremented when this order committed.
    app.set_stock(product, 5).await;
    let order_id = app
        .seed_unpaid_order(
            user,
            product,
            2,
            dec!(130),
            PaymentMethod::Vnpay,
            Utc::now() - Duration::minutes(GRACE_MINS + 1),
        )
        .await;

    let stats = reclaimer::run_once(&app.db, grace(), ttl(), None).await;
    assert_eq!(stats.reclaimed, 1);
    assert_eq!(stats.failed, 0);

    let order = app.order(order_id).await;
    assert_eq!(order.order_status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(app.stock_of(product).await, 7);
}

#[tokio::test]
async fn second_sweep_is_a_no_op() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Night Mask", dec!(85), 10, true).await;

    app.set_stock(product, 9).await;
    app.seed_unpaid_order(
        user,
        product,
        1,
        dec!(85),
        PaymentMethod::Vnpay,
        Utc::now() - Duration::minutes(GRACE_MINS + 10),
    )
    .await;

    let first = reclaimer::run_once(&app.db, grace(), ttl(), None).await;
    assert_eq!(first.reclaimed, 1);
    assert_eq!(app.stock_of(product).await, 10);

    // Cancelled orders no longer match the sweep; stock is restored once.
    let second = reclaimer::run_once(&app.db, grace(), ttl(), None).await;
    assert_eq!(second.reclaimed, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(app.stock_of(product).await, 10);
}

#[tokio::test]
async fn fresh_orders_are_left_alone() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Sunscreen", dec!(95), 6, true).await;

    app.set_stock(product, 5).await;
    let order_id = app
        .seed_unpaid_order(
            user,
            product,
            1,
            dec!(95),
            PaymentMethod::Vnpay,
            Utc::now() - Duration::minutes(GRACE_MINS - 5),
        )
        .await;

    let stats = reclaimer::run_once(&app.db, grace(), ttl(), None).await;
    assert_eq!(stats.reclaimed, 0);

    let order = app.order(order_id).await;
    assert_eq!(order.order_status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(app.stock_of(product).await, 5);
}

#[tokio::test]
async fn cod_orders_are_never_reclaimed() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let product = app.seed_product("Hand Cream", dec!(55), 12, true).await;

    // COD orders wait for the courier, not the gateway; even a week-old one
    // stays pending.
    app.set_stock(product, 11).await;
    let order_id = app
        .seed_unpaid_order(
            user,
            product,
            1,
            dec!(55),
            PaymentMethod::Cod,
            Utc::now() - Duration::days(7),
        )
        .await;

    let stats = reclaimer::run_once(&app.db, grace(), ttl(), None).await;
    assert_eq!(stats.reclaimed, 0);
    assert_eq!(app.order(order_id).await.order_status, OrderStatus::Pending);
    assert_eq!(app.stock_of(product).await, 11);
}

#[tokio::test]
async fn sweep_purges_expired_pending_payments() {
    let app = TestApp::new().await;

    pending_payment::ActiveModel {
        order_ref: Set("GCSTALE".to_string()),
        user_id: Set(Uuid::new_v4()),
        payload: Set("{}".to_string()),
        created_at: Set(Utc::now() - Duration::minutes(common::PENDING_TTL_MINS + 1)),
    }
    .insert(&*app.db)
    .await
    .unwrap();

    pending_payment::ActiveModel {
        order_ref: Set("GCLIVE".to_string()),
        user_id: Set(Uuid::new_v4()),
        payload: Set("{}".to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(&*app.db)
    .await
    .unwrap();

    reclaimer::run_once(&app.db, grace(), ttl(), None).await;

    assert!(pending_payment::Entity::find_by_id("GCSTALE")
        .one(&*app.db)
        .await
        .unwrap()
        .is_none());
    assert!(pending_payment::Entity::find_by_id("GCLIVE")
        .one(&*app.db)
        .await
        .unwrap()
        .is_some());
}
