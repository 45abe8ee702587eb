//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::WebhookVerifier;
use chrono::Utc;
use common::{AddressId, UserId};
use domain::{Address, CartIdentity, Money, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{CommerceStore, InMemoryStore};
use tower::ServiceExt;

const SECRET: &str = "whsec_api_tests";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, InMemoryStore) {
    let store = InMemoryStore::new();
    let mut config = api::Config::default();
    config.webhook.secret = SECRET.to_string();
    let state = api::create_state(store.clone(), &config);
    (api::create_app(state, get_metrics_handle()), store)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn as_user(method: &str, uri: &str, user: UserId, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user.to_string());
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn seed(store: &InMemoryStore, user: UserId, stock: i64) -> (Product, AddressId) {
    let product = Product::new("Backpack", "BP-1", Money::from_major(2400), stock);
    store.save_product(product.clone()).await.unwrap();
    let address = Address {
        id: AddressId::new(),
        owner: CartIdentity::User(user),
        name: "Sadia".to_string(),
        phone: "01500000000".to_string(),
        address_line1: "Road 27".to_string(),
        address_line2: None,
        district: "Dhaka".to_string(),
        division: "Dhaka".to_string(),
        postal_code: None,
    };
    let address_id = address.id;
    store.save_address(address).await.unwrap();
    (product, address_id)
}

/// Adds the product to the cart and places an order, returning the order body.
async fn place_order(app: &axum::Router, user: UserId, product: &Product, address_id: AddressId, method: &str) -> Value {
    let (status, _) = send(
        app,
        as_user(
            "POST",
            "/cart/items",
            user,
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, order) = send(
        app,
        as_user(
            "POST",
            "/orders",
            user,
            Some(json!({ "address_id": address_id, "payment_method": method })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();
    let (status, json) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cart_requires_identity() {
    let (app, _) = setup();
    let (status, json) = send(
        &app,
        Request::builder().uri("/cart").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_guest_cart_round_trip() {
    let (app, store) = setup();
    let (product, _) = seed(&store, UserId::new(), 5).await;

    let request = Request::builder()
        .method("POST")
        .uri("/cart/items")
        .header("x-session-token", "guest-abc")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "product_id": product.id, "quantity": 2 }).to_string(),
        ))
        .unwrap();
    let (status, cart) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["identity"]["kind"], "guest");
    assert_eq!(cart["subtotal"], 480_000);
    assert_eq!(cart["total_quantity"], 2);
}

#[tokio::test]
async fn test_add_too_many_items_conflicts() {
    let (app, store) = setup();
    let user = UserId::new();
    let (product, _) = seed(&store, user, 1).await;

    let (status, _) = send(
        &app,
        as_user(
            "POST",
            "/cart/items",
            user,
            Some(json!({ "product_id": product.id, "quantity": 2 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_preview_and_create_order() {
    let (app, store) = setup();
    let user = UserId::new();
    let (product, address_id) = seed(&store, user, 3).await;

    send(
        &app,
        as_user(
            "POST",
            "/cart/items",
            user,
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        ),
    )
    .await;

    let (status, preview) = send(
        &app,
        as_user(
            "POST",
            "/checkout/preview",
            user,
            Some(json!({ "address_id": address_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["valid"], true);
    assert_eq!(preview["subtotal"], 240_000);
    assert_eq!(preview["shipping_cost"], 0);
    assert_eq!(preview["shipping_zone"], "near");

    let (status, order) = send(
        &app,
        as_user(
            "POST",
            "/orders",
            user,
            Some(json!({ "address_id": address_id, "payment_method": "cash_on_delivery" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));

    let (status, orders) = send(&app, as_user("GET", "/orders", user, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let uri = format!("/orders/{}", order["id"].as_str().unwrap());
    let (status, fetched) = send(&app, as_user("GET", &uri, user, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], order["id"]);

    let (status, _) = send(&app, as_user("GET", &uri, UserId::new(), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_order_validation_errors() {
    let (app, store) = setup();
    let user = UserId::new();
    seed(&store, user, 3).await;

    let (status, body) = send(
        &app,
        as_user(
            "POST",
            "/orders",
            user,
            Some(json!({ "address_id": AddressId::new() })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn test_invalid_order_id_format() {
    let (app, _) = setup();
    let (status, _) = send(&app, as_user("GET", "/orders/not-a-uuid", UserId::new(), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_cannot_cancel_shipped_order() {
    let (app, store) = setup();
    let user = UserId::new();
    let (product, address_id) = seed(&store, user, 3).await;
    let order = place_order(&app, user, &product, address_id, "cash_on_delivery").await;
    let uri = format!("/admin/orders/{}/status", order["id"].as_str().unwrap());

    for status in ["confirmed", "processing", "shipped"] {
        let (code, body) = send(
            &app,
            as_user("POST", &uri, user, Some(json!({ "status": status }))),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], status);
    }

    let (code, body) = send(
        &app,
        as_user("POST", &uri, user, Some(json!({ "status": "cancelled" }))),
    )
    .await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("shipped"));
}

#[tokio::test]
async fn test_payment_webhook_is_idempotent() {
    let (app, store) = setup();
    let user = UserId::new();
    let (product, address_id) = seed(&store, user, 3).await;
    let order = place_order(&app, user, &product, address_id, "card").await;
    assert_eq!(order["payment_status"], "awaiting_payment");

    let payload = json!({
        "eventType": "payment.succeeded",
        "orderReference": order["order_number"],
        "externalPaymentId": "pi_api_1",
        "amount": order["total"],
        "currency": "BDT",
    })
    .to_string();
    let signature = WebhookVerifier::new(SECRET, chrono::Duration::seconds(300))
        .sign(payload.as_bytes(), Utc::now().timestamp())
        .unwrap();
    let webhook = || {
        Request::builder()
            .method("POST")
            .uri("/webhooks/payments")
            .header("content-type", "application/json")
            .header("x-signature", signature.clone())
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let (status, body) = send(&app, webhook()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "processed");

    let (status, body) = send(&app, webhook()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");
    assert_eq!(store.payment_count().await, 1);

    let uri = format!("/orders/{}", order["id"].as_str().unwrap());
    let (_, fetched) = send(&app, as_user("GET", &uri, user, None)).await;
    assert_eq!(fetched["status"], "confirmed");
    assert_eq!(fetched["payment_status"], "paid");
}

#[tokio::test]
async fn test_unsigned_webhook_is_unauthorized() {
    let (app, store) = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .body(Body::from(r#"{"eventType":"payment.succeeded"}"#))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(store.payment_count().await, 0);
}

#[tokio::test]
async fn test_merge_requires_both_headers() {
    let (app, _) = setup();
    let (status, _) = send(&app, as_user("POST", "/cart/merge", UserId::new(), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/cart/merge")
        .header("x-user-id", UserId::new().to_string())
        .header("x-session-token", "guest-merge")
        .body(Body::empty())
        .unwrap();
    let (status, cart) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["identity"]["kind"], "user");
}
