//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate all tables before
//! each test, so they are serialised with `serial_test`. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use common::{AddressId, SessionToken, UserId};
use domain::{
    Address, Cart, CartIdentity, Coupon, Money, Order, OrderDraft, OrderItem, OrderNumber,
    OrderStatus, OrderTotals, Payment, PaymentMethod, PaymentRecordStatus, PaymentStatus, Product,
    ShippingMethod,
};
use rust_decimal_macros::dec;
use serial_test::serial;
use sqlx::PgPool;
use store::{CommerceStore, OrderPlacement, PaymentRecordOutcome, PostgresStore, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE payments, order_status_history, order_items, orders, coupons, cart_items, carts, addresses, products",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn address_for(owner: &CartIdentity) -> Address {
    Address {
        id: AddressId::new(),
        owner: owner.clone(),
        name: "Farhan".to_string(),
        phone: "01500000000".to_string(),
        address_line1: "7 Green Road".to_string(),
        address_line2: None,
        district: "Dhaka".to_string(),
        division: "Dhaka".to_string(),
        postal_code: Some("1205".to_string()),
    }
}

fn order_for(cart: &Cart, product: &Product, quantity: u32, sequence: u64) -> Order {
    let subtotal = product.price.multiply(quantity);
    let draft = OrderDraft {
        identity: cart.identity.clone(),
        payment_method: PaymentMethod::Card,
        shipping_method: ShippingMethod::Standard,
        totals: OrderTotals {
            subtotal,
            total: subtotal,
            ..OrderTotals::default()
        },
        shipping_address: address_for(&cart.identity).snapshot(),
        coupon_code: cart.coupon_code.clone(),
        items: vec![OrderItem::from_product(product, None, quantity)],
    };
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    Order::place(draft, OrderNumber::new(date, sequence), Utc::now())
}

async fn seed_cart(store: &PostgresStore, identity: CartIdentity, product: &Product, qty: u32) -> Cart {
    let mut cart = Cart::new(identity, Utc::now(), Duration::days(7));
    cart.add_line(product, None, qty, Utc::now()).unwrap();
    store.save_cart(&cart).await.unwrap();
    cart
}

#[tokio::test]
#[serial]
async fn product_and_address_round_trip() {
    let store = get_test_store().await;
    let product = Product::new("Rice", "RICE-5KG", Money::from_major(450), 30)
        .with_images(vec!["rice.png".to_string()]);
    store.save_product(product.clone()).await.unwrap();

    let loaded = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(loaded, product);

    let owner = CartIdentity::User(UserId::new());
    let address = address_for(&owner);
    store.save_address(address.clone()).await.unwrap();

    assert_eq!(
        store.get_address(address.id, &owner).await.unwrap(),
        Some(address.clone())
    );
    let other = CartIdentity::Guest(SessionToken::new("someone-else"));
    assert!(store.get_address(address.id, &other).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn cart_is_unique_per_identity() {
    let store = get_test_store().await;
    let identity = CartIdentity::Guest(SessionToken::new("sess-unique"));

    let first = store
        .create_cart_if_absent(Cart::new(identity.clone(), Utc::now(), Duration::days(7)))
        .await
        .unwrap();
    let second = store
        .create_cart_if_absent(Cart::new(identity.clone(), Utc::now(), Duration::days(7)))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
}

#[tokio::test]
#[serial]
async fn cart_lines_persist_in_order() {
    let store = get_test_store().await;
    let a = Product::new("A", "A-1", Money::from_major(10), 10);
    let b = Product::new("B", "B-1", Money::from_major(20), 10);

    let mut cart = Cart::new(CartIdentity::User(UserId::new()), Utc::now(), Duration::days(7));
    cart.add_line(&a, None, 1, Utc::now()).unwrap();
    cart.add_line(&b, None, 3, Utc::now()).unwrap();
    store.save_cart(&cart).await.unwrap();

    let loaded = store.get_cart(&cart.identity).await.unwrap().unwrap();
    assert_eq!(loaded.items.len(), 2);
    assert_eq!(loaded.items[0].product_id, a.id);
    assert_eq!(loaded.items[1].quantity, 3);
    assert_eq!(loaded.subtotal(), Money::from_major(70));
}

#[tokio::test]
#[serial]
async fn place_order_is_atomic() {
    let store = get_test_store().await;
    let product = Product::new("Oil", "OIL-1L", Money::from_major(180), 5);
    store.save_product(product.clone()).await.unwrap();

    let identity = CartIdentity::User(UserId::new());
    let cart = seed_cart(&store, identity.clone(), &product, 2).await;

    let placed = store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 2, 1), &cart))
        .await
        .unwrap();

    // Timestamps lose sub-microsecond precision in Postgres, so compare fields.
    let loaded = store.get_order(placed.id).await.unwrap().unwrap();
    assert_eq!(loaded.order_number, placed.order_number);
    assert_eq!(loaded.items, placed.items);
    assert_eq!(loaded.totals, placed.totals);
    assert_eq!(loaded.shipping_address, placed.shipping_address);
    assert_eq!(loaded.payment_status, PaymentStatus::AwaitingPayment);
    assert_eq!(loaded.history.len(), 1);
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 3);

    // User carts survive as empty shells.
    let cart = store.get_cart(&identity).await.unwrap().unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
#[serial]
async fn stock_race_rolls_back_everything() {
    let store = get_test_store().await;
    let product = Product::new("Salt", "SALT-1", Money::from_major(40), 1);
    store.save_product(product.clone()).await.unwrap();

    let identity = CartIdentity::Guest(SessionToken::new("sess-race"));
    let cart = seed_cart(&store, identity.clone(), &product, 1).await;

    // Someone else takes the last unit first.
    let mut sold_out = product.clone();
    sold_out.stock = 0;
    store.save_product(sold_out).await.unwrap();

    let result = store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 1, 1), &cart))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::StockRaceLost { available: 0, .. })
    ));
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 0);
    assert!(store.get_cart(&identity).await.unwrap().is_some());
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    assert!(
        store
            .get_order_by_number(&OrderNumber::new(day, 1))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[serial]
async fn duplicate_order_number_detected() {
    let store = get_test_store().await;
    let product = Product::new("Tea", "TEA-1", Money::from_major(90), 10);
    store.save_product(product.clone()).await.unwrap();

    let cart = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 1).await;
    store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 1, 7), &cart))
        .await
        .unwrap();

    let result = store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 1, 7), &cart))
        .await;
    assert!(matches!(result, Err(StoreError::DuplicateOrderNumber(_))));
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 9);
}

#[tokio::test]
#[serial]
async fn cart_edited_after_pricing_rolls_back() {
    let store = get_test_store().await;
    let product = Product::new("Rice", "RICE-1KG", Money::from_major(95), 10);
    store.save_product(product.clone()).await.unwrap();

    let identity = CartIdentity::User(UserId::new());
    let mut cart = seed_cart(&store, identity.clone(), &product, 1).await;
    let placement = OrderPlacement::new(order_for(&cart, &product, 1, 1), &cart);

    // The quantity is raised after the order was priced.
    let line = cart.items[0].id;
    cart.set_quantity(line, 3, &product, Utc::now()).unwrap();
    store.save_cart(&cart).await.unwrap();

    let result = store.place_order(placement).await;
    assert!(matches!(result, Err(StoreError::CartChanged(_))));

    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 10);
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    assert!(
        store
            .get_order_by_number(&OrderNumber::new(day, 1))
            .await
            .unwrap()
            .is_none()
    );
    let stored = store.get_cart(&identity).await.unwrap().unwrap();
    assert_eq!(stored.items[0].quantity, 3);
}

#[tokio::test]
#[serial]
async fn coupon_usage_is_conditional() {
    let store = get_test_store().await;
    let product = Product::new("Soap", "SOAP-1", Money::from_major(60), 10);
    store.save_product(product.clone()).await.unwrap();

    let coupon = Coupon::percentage("TENOFF", dec!(10), Utc::now()).with_usage_limit(1);
    store.save_coupon(coupon.clone()).await.unwrap();
    let loaded = store.get_coupon(&coupon.code).await.unwrap().unwrap();
    assert_eq!(loaded.discount, coupon.discount);
    assert_eq!(loaded.usage_limit, Some(1));

    let mut first = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 1).await;
    first.apply_coupon(coupon.code.clone(), Money::from_major(6), Utc::now());
    store
        .place_order(OrderPlacement::new(order_for(&first, &product, 1, 1), &first))
        .await
        .unwrap();

    let mut second = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 1).await;
    second.apply_coupon(coupon.code.clone(), Money::from_major(6), Utc::now());
    let result = store
        .place_order(OrderPlacement::new(order_for(&second, &product, 1, 2), &second))
        .await;

    assert!(matches!(result, Err(StoreError::CouponExhausted(_))));
    let stored = store.get_coupon(&coupon.code).await.unwrap().unwrap();
    assert_eq!(stored.usage_count, 1);
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 9);
}

#[tokio::test]
#[serial]
async fn status_update_and_refund_restock() {
    let store = get_test_store().await;
    let product = Product::new("Fan", "FAN-1", Money::from_major(2500), 4);
    store.save_product(product.clone()).await.unwrap();

    let cart = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 2).await;
    let order = store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 2, 1), &cart))
        .await
        .unwrap();

    let payment = Payment::new(
        order.id,
        PaymentMethod::Card,
        Money::from_major(5000),
        "BDT",
        "pay_abc",
        PaymentRecordStatus::Completed,
        Utc::now(),
    );
    let outcome = store
        .record_payment(payment, Some(order.confirm_payment(Utc::now())))
        .await
        .unwrap();
    assert_eq!(outcome, PaymentRecordOutcome::Recorded);

    let confirmed = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Paid);

    let refund = confirmed
        .transition(OrderStatus::Refunded, None, Utc::now())
        .unwrap();
    store.apply_order_update(refund).await.unwrap();

    let refunded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.history.len(), 3);
    assert!(!refunded.stock_reserved);
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 4);

    let payments = store.get_payments_for_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentRecordStatus::Refunded);
}

#[tokio::test]
#[serial]
async fn stale_version_is_rejected() {
    let store = get_test_store().await;
    let product = Product::new("Pan", "PAN-1", Money::from_major(700), 4);
    store.save_product(product.clone()).await.unwrap();

    let cart = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 1).await;
    let order = store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 1, 1), &cart))
        .await
        .unwrap();

    let confirm = order
        .transition(OrderStatus::Confirmed, None, Utc::now())
        .unwrap();
    let cancel = order
        .transition(OrderStatus::Cancelled, None, Utc::now())
        .unwrap();

    store.apply_order_update(confirm).await.unwrap();
    let result = store.apply_order_update(cancel).await;
    assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
    assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 3);
}

#[tokio::test]
#[serial]
async fn duplicate_payment_reference_is_a_no_op() {
    let store = get_test_store().await;
    let product = Product::new("Cap", "CAP-1", Money::from_major(300), 4);
    store.save_product(product.clone()).await.unwrap();

    let cart = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 1).await;
    let order = store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 1, 1), &cart))
        .await
        .unwrap();

    let payment = || {
        Payment::new(
            order.id,
            PaymentMethod::Card,
            Money::from_major(300),
            "BDT",
            "pay_dup",
            PaymentRecordStatus::Completed,
            Utc::now(),
        )
    };

    let first = store
        .record_payment(payment(), Some(order.confirm_payment(Utc::now())))
        .await
        .unwrap();
    let second = store
        .record_payment(payment(), Some(order.confirm_payment(Utc::now())))
        .await
        .unwrap();

    assert_eq!(first, PaymentRecordOutcome::Recorded);
    assert_eq!(second, PaymentRecordOutcome::Duplicate);
    assert_eq!(store.get_payments_for_order(order.id).await.unwrap().len(), 1);

    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.history.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_completion_overwrites_failed_payment() {
    let store = get_test_store().await;
    let product = Product::new("Mug", "MUG-1", Money::from_major(250), 4);
    store.save_product(product.clone()).await.unwrap();

    let cart = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 1).await;
    let order = store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 1, 1), &cart))
        .await
        .unwrap();

    let payment = |status| {
        Payment::new(
            order.id,
            PaymentMethod::Card,
            Money::from_major(250),
            "BDT",
            "pay_retry",
            status,
            Utc::now(),
        )
    };

    let failed = store
        .record_payment(payment(PaymentRecordStatus::Failed), order.fail_payment(Utc::now()))
        .await
        .unwrap();
    let order = store.get_order(order.id).await.unwrap().unwrap();
    let completed = store
        .record_payment(
            payment(PaymentRecordStatus::Completed),
            Some(order.confirm_payment(Utc::now())),
        )
        .await
        .unwrap();
    let redelivered_failure = store
        .record_payment(payment(PaymentRecordStatus::Failed), None)
        .await
        .unwrap();

    assert_eq!(failed, PaymentRecordOutcome::Recorded);
    assert_eq!(completed, PaymentRecordOutcome::Recorded);
    assert_eq!(redelivered_failure, PaymentRecordOutcome::Duplicate);

    let payments = store.get_payments_for_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentRecordStatus::Completed);

    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Confirmed);
}

#[tokio::test]
#[serial]
async fn counts_orders_in_window_and_purges_guest_carts() {
    let store = get_test_store().await;
    let product = Product::new("Bag", "BAG-1", Money::from_major(800), 10);
    store.save_product(product.clone()).await.unwrap();

    let cart = seed_cart(&store, CartIdentity::User(UserId::new()), &product, 1).await;
    store
        .place_order(OrderPlacement::new(order_for(&cart, &product, 1, 1), &cart))
        .await
        .unwrap();

    let now = Utc::now();
    assert_eq!(
        store
            .count_orders_between(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .count_orders_between(now + Duration::hours(1), now + Duration::hours(2))
            .await
            .unwrap(),
        0
    );

    let stale = Cart::new(
        CartIdentity::Guest(SessionToken::new("stale")),
        now - Duration::days(30),
        Duration::days(7),
    );
    store.save_cart(&stale).await.unwrap();
    assert_eq!(store.delete_expired_guest_carts(now).await.unwrap(), 1);
}
