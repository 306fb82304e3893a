//! Router-level tests: the HTTP surface over the same in-memory database.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::TestApp;
use glowcart_api::config::{AppConfig, ReclaimConfig, ShippingConfig, VnpayConfig};
use glowcart_api::gateway::VnpayGateway;
use glowcart_api::handlers::AppServices;
use glowcart_api::AppState;
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        db_max_connections: 1,
        db_min_connections: 1,
        pending_payment_ttl_mins: common::PENDING_TTL_MINS,
        shipping: ShippingConfig::default(),
        vnpay: VnpayConfig::default(),
        reclaim: ReclaimConfig::default(),
    }
}

fn router_for(app: &TestApp) -> Router {
    let state = AppState {
        db: app.db.clone(),
        config: test_config(),
        event_sender: app.event_sender.clone(),
        services: AppServices {
            settlement: Arc::new(app.settlement.clone()),
            carts: Arc::new(app.carts.clone()),
            gateway: Arc::new(VnpayGateway::new(VnpayConfig::default())),
        },
    };
    glowcart_api::app_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = TestApp::new().await;
    let response = router_for(&app)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_identity_header_is_rejected() {
    let app = TestApp::new().await;
    let request = Request::post("/api/v1/checkout")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "shipping_address": "a", "shipping_method": "standard" }).to_string(),
        ))
        .unwrap();

    let response = router_for(&app).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn cod_checkout_over_http() {
    let app = TestApp::new().await;
    let router = router_for(&app);
    let user = Uuid::new_v4();
    let product = app.seed_product("Rose Serum", dec!(100), 5, true).await;

    let add = Request::post("/api/v1/cart/items")
        .header("x-user-id", user.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "product_id": product, "quantity": 2 }).to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(add).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let checkout = Request::post("/api/v1/checkout")
        .header("x-user-id", user.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "shipping_address": "12 Hang Bai, Hoan Kiem, Hanoi",
                "shipping_method": "standard"
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(checkout).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_amount"], "30200");
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    assert_eq!(app.stock_of(product).await, 3);

    // The committed order is readable by its owner.
    let get = Request::get(format!("/api/v1/orders/{}", order_id))
        .header("x-user-id", user.to_string())
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["payment_method"], "cod");
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unsigned_gateway_callback_redirects_with_failure() {
    let app = TestApp::new().await;
    let response = router_for(&app)
        .oneshot(
            Request::get("/api/v1/payments/vnpay/return?vnp_TxnRef=GC1&vnp_ResponseCode=00")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.contains("status=failed"));
    assert!(location.contains("reason=signature"));
}
