//! HTTP surface tests over the in-memory backends.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use std::sync::Arc;
use storefront_core::ids::UserId;
use storefront_services::Services;
use storefront_testing::fixtures::fixed_coupon;
use storefront_testing::mocks::{
    InMemoryLockManager, MemoryKv, MemoryStores, MockGateway, test_clock,
};
use storefront_web::{AppState, router};
use tower::ServiceExt;

fn app() -> (Router, MemoryStores, MockGateway) {
    let stores = MemoryStores::new(test_clock());
    let gateway = MockGateway::new();
    let services = Arc::new(Services::new(
        stores.clone(),
        MemoryKv::new(),
        InMemoryLockManager::new(),
        gateway.clone(),
        test_clock(),
    ));
    (
        router(AppState::new(services)),
        stores,
        gateway,
    )
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _, _) = app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn balance_endpoint_returns_the_wire_shape() {
    let (app, stores, _) = app();
    stores.seed_balance(UserId::new(1), 50_000);

    let response = app
        .oneshot(
            Request::get("/api/v1/users/me/balance")
                .header("x-user-id", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["userId"], 1);
    assert_eq!(json["balance"], 50_000);
    assert!(json["lastUpdated"].is_string());
}

#[tokio::test]
async fn missing_user_header_is_rejected() {
    let (app, _, _) = app();
    let response = app
        .oneshot(
            Request::get("/api/v1/users/me/balance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "VALIDATION001");
}

#[tokio::test]
async fn unknown_balance_is_point004() {
    let (app, _, _) = app();
    let response = app
        .oneshot(
            Request::get("/api/v1/points/404")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "POINT004");
    assert_eq!(json["error"]["data"]["userId"], 404);
}

/// S1 at the HTTP layer: create an order, pay MIXED, get 201 with the
/// receipt shape of the contract.
#[tokio::test]
async fn mixed_payment_over_http() {
    let (app, stores, gateway) = app();
    stores.seed_balance(UserId::new(1), 50_000);
    gateway.script_success("toss_1");

    let create = Request::post("/api/v1/orders")
        .header("x-user-id", "1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "items": [{
                    "productId": 1,
                    "productName": "widget",
                    "unitPrice": 17_500,
                    "quantity": 2
                }]
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["finalAmount"], 35_000);
    let order_id = order["orderId"].as_i64().unwrap();

    let pay = Request::post("/api/v1/payments")
        .header("x-user-id", "1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "orderId": order_id,
                "paymentMethod": "MIXED",
                "pointAmount": 20_000,
                "pgAmount": 15_000,
                "pgPaymentRequest": {
                    "provider": "TOSS",
                    "method": "CARD",
                    "cardNumberMasked": "****1234"
                }
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(pay).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let receipt = body_json(response).await;
    assert_eq!(receipt["orderId"], order_id);
    assert_eq!(receipt["status"], "COMPLETED");
    assert_eq!(receipt["totalAmount"], 35_000);
    assert_eq!(receipt["pointAmount"], 20_000);
    assert_eq!(receipt["pgAmount"], 15_000);
    assert_eq!(receipt["pgTransactionId"], "toss_1");
    assert_eq!(receipt["balanceAfter"], 30_000);
}

/// S2 at the HTTP layer: insufficient balance is a 409 with POINT-style
/// data.
#[tokio::test]
async fn insufficient_balance_over_http() {
    let (app, stores, _) = app();
    stores.seed_balance(UserId::new(1), 10_000);

    let create = Request::post("/api/v1/orders")
        .header("x-user-id", "1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "items": [{
                    "productId": 1,
                    "productName": "widget",
                    "unitPrice": 20_000,
                    "quantity": 1
                }]
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    let order = body_json(response).await;
    let order_id = order["orderId"].as_i64().unwrap();

    let pay = Request::post("/api/v1/payments")
        .header("x-user-id", "1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "orderId": order_id,
                "paymentMethod": "POINT",
                "pointAmount": 20_000,
                "pgAmount": 0
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(pay).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "PAYMENT002");
    assert_eq!(json["error"]["data"]["currentBalance"], 10_000);
    assert_eq!(json["error"]["data"]["useAmount"], 20_000);
}

/// S3 at the HTTP layer: a declined gateway is a 402 PAYMENT003.
#[tokio::test]
async fn gateway_decline_over_http() {
    let (app, stores, gateway) = app();
    stores.seed_balance(UserId::new(1), 50_000);
    gateway.script_decline("DECLINED");

    let create = Request::post("/api/v1/orders")
        .header("x-user-id", "1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "items": [{
                    "productId": 1,
                    "productName": "widget",
                    "unitPrice": 35_000,
                    "quantity": 1
                }]
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    let order = body_json(response).await;
    let order_id = order["orderId"].as_i64().unwrap();

    let pay = Request::post("/api/v1/payments")
        .header("x-user-id", "1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({
                "orderId": order_id,
                "paymentMethod": "MIXED",
                "pointAmount": 20_000,
                "pgAmount": 15_000,
                "pgPaymentRequest": { "provider": "TOSS", "method": "CARD" }
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(pay).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "PAYMENT003");
}

#[tokio::test]
async fn coupon_issue_over_http() {
    let (app, stores, _) = app();
    stores.seed_coupon(fixed_coupon(7, 5_000, 1));

    let issue = |user: i64| {
        Request::post("/api/v1/coupons/7/issue")
            .header("x-user-id", user.to_string())
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(issue(1)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ACCEPTED");
    assert_eq!(json["queuePosition"], 1);

    let response = app.clone().oneshot(issue(1)).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "ALREADY_ISSUED");

    let response = app.oneshot(issue(2)).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "SOLD_OUT");
}

#[tokio::test]
async fn popular_products_default_limit() {
    let (app, _, _) = app();
    let response = app
        .oneshot(
            Request::get("/api/v1/products/popular")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.as_array().unwrap().is_empty());
}
