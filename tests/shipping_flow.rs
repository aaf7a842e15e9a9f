//! End-to-end checkout and catalog-guard scenarios against Postgres.

use axum::extract::{Path, State};
use axum::Json;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use shipgate::catalog::methods::{self, MethodRequest};
use shipgate::checkout::{self, CheckoutRequest, PaymentUpdateRequest};
use shipgate::error::ApiError;
use shipgate::AppState;

fn state(pool: &PgPool) -> AppState {
    AppState { db: pool.clone(), nats: None }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
    n
}

async fn seed_zone(pool: &PgPool, code: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO shipping_zones (id, code, name) VALUES ($1, $2, $2)")
        .bind(id)
        .bind(code)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_gateway(pool: &PgPool, code: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO shipping_gateways (id, code, name) VALUES ($1, $2, $2)")
        .bind(id)
        .bind(code)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_link(pool: &PgPool, zone_id: Uuid, gateway_id: Uuid, is_available: bool) {
    sqlx::query("INSERT INTO zone_gateways (id, zone_id, gateway_id, is_available) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(zone_id)
        .bind(gateway_id)
        .bind(is_available)
        .execute(pool)
        .await
        .unwrap();
}

async fn seed_flat_method(pool: &PgPool, zone_id: Uuid, gateway_id: Uuid, base_cost: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO shipping_methods (id, zone_id, gateway_id, name, method_type, base_cost) \
         VALUES ($1, $2, $3, 'Standard', 'flat', $4)",
    )
    .bind(id)
    .bind(zone_id)
    .bind(gateway_id)
    .bind(dec(base_cost))
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn seed_payment_method(pool: &PgPool, enabled: bool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO payment_methods (id, code, name, is_enabled) VALUES ($1, 'COD', 'Cash on delivery', $2)")
        .bind(id)
        .bind(enabled)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_product(pool: &PgPool, price: &str, weight_g: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO products (id, name, price, weight_g) VALUES ($1, 'Widget', $2, $3)")
        .bind(id)
        .bind(dec(price))
        .bind(weight_g)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_cart_line(pool: &PgPool, session: &str, product_id: Uuid, quantity: i32, price: &str) {
    sqlx::query(
        "INSERT INTO cart_items (id, session_id, product_id, quantity, price_at_add) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(session)
    .bind(product_id)
    .bind(quantity)
    .bind(dec(price))
    .execute(pool)
    .await
    .unwrap();
}

struct Checkoutable {
    method_id: Uuid,
    payment_id: Uuid,
}

async fn seed_checkoutable_catalog(pool: &PgPool) -> Checkoutable {
    let zone = seed_zone(pool, "US").await;
    let gateway = seed_gateway(pool, "MANUAL").await;
    seed_link(pool, zone, gateway, true).await;
    let method_id = seed_flat_method(pool, zone, gateway, "5.00").await;
    let payment_id = seed_payment_method(pool, true).await;
    Checkoutable { method_id, payment_id }
}

fn checkout_request(c: &Checkoutable) -> CheckoutRequest {
    CheckoutRequest {
        shipping_method_id: c.method_id,
        payment_method_id: c.payment_id,
        shipping_address: serde_json::json!({"line1": "1 Main St", "country": "US"}),
        billing_address: None,
    }
}

fn method_request(zone_id: Uuid, gateway_id: Uuid, name: &str) -> MethodRequest {
    MethodRequest {
        zone_id,
        gateway_id,
        name: name.into(),
        method_type: "flat".into(),
        base_cost: Some(dec("5.00")),
        cost_per_kg: None,
        weight_threshold_g: None,
        min_free_threshold: None,
        max_free_weight_g: None,
        max_weight_limit_g: None,
        percentage_rate: None,
        currency: None,
        estimated_days_min: None,
        estimated_days_max: None,
        status: None,
        sort_order: None,
        max_dimensions: None,
        restricted_items: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn empty_cart_checkout_is_rejected(pool: PgPool) {
    let s = state(&pool);
    let catalog = seed_checkoutable_catalog(&pool).await;

    let result = checkout::place_order(
        State(s),
        Path("sess-empty".to_string()),
        Json(checkout_request(&catalog)),
    )
    .await;

    assert!(matches!(result, Err(ApiError::Validation(ref m)) if m.contains("cart is empty")));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM orders").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn method_create_requires_available_link(pool: PgPool) {
    let s = state(&pool);
    let zone = seed_zone(&pool, "EU").await;
    let gateway = seed_gateway(&pool, "DHL").await;

    // No link row at all.
    let result = methods::create_method(State(s.clone()), Json(method_request(zone, gateway, "Standard"))).await;
    assert!(matches!(result, Err(ApiError::Conflict(_))));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM shipping_methods").await, 0);

    // Link exists but is not available.
    seed_link(&pool, zone, gateway, false).await;
    let result = methods::create_method(State(s.clone()), Json(method_request(zone, gateway, "Standard"))).await;
    assert!(matches!(result, Err(ApiError::Conflict(_))));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM shipping_methods").await, 0);

    sqlx::query("UPDATE zone_gateways SET is_available = TRUE")
        .execute(&pool)
        .await
        .unwrap();
    let result = methods::create_method(State(s), Json(method_request(zone, gateway, "Standard"))).await;
    assert!(result.is_ok());
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_method_name_scoped_to_zone_gateway_pair(pool: PgPool) {
    let s = state(&pool);
    let zone = seed_zone(&pool, "EU").await;
    let dhl = seed_gateway(&pool, "DHL").await;
    let ups = seed_gateway(&pool, "UPS").await;
    seed_link(&pool, zone, dhl, true).await;
    seed_link(&pool, zone, ups, true).await;

    methods::create_method(State(s.clone()), Json(method_request(zone, dhl, "Standard")))
        .await
        .unwrap();
    let result = methods::create_method(State(s.clone()), Json(method_request(zone, dhl, "Standard"))).await;
    assert!(matches!(result, Err(ApiError::Conflict(ref m)) if m.contains("duplicate method name")));

    // Same name under a different gateway in the same zone is fine.
    methods::create_method(State(s), Json(method_request(zone, ups, "Standard")))
        .await
        .unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM shipping_methods").await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn checkout_snapshots_items_and_clears_cart(pool: PgPool) {
    let s = state(&pool);
    let catalog = seed_checkoutable_catalog(&pool).await;
    let widget = seed_product(&pool, "10.00", 250).await;
    let gadget = seed_product(&pool, "4.50", 100).await;
    seed_cart_line(&pool, "sess-1", widget, 2, "10.00").await;
    seed_cart_line(&pool, "sess-1", gadget, 3, "4.50").await;

    let (_, Json(response)) = checkout::place_order(
        State(s),
        Path("sess-1".to_string()),
        Json(checkout_request(&catalog)),
    )
    .await
    .unwrap();

    // subtotal 33.50 + flat 5.00
    assert_eq!(response.total_amount, dec("38.50"));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM order_items").await, 2);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cart_items").await, 0);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM payment_transactions WHERE status = 'pending'").await,
        1
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn checkout_rolls_back_fully_on_late_failure(pool: PgPool) {
    let s = state(&pool);
    let catalog = seed_checkoutable_catalog(&pool).await;
    let widget = seed_product(&pool, "10.00", 250).await;
    seed_cart_line(&pool, "sess-1", widget, 1, "10.00").await;

    // Fail the transaction after the order and item inserts.
    sqlx::query(
        "CREATE FUNCTION reject_payment_insert() RETURNS trigger LANGUAGE plpgsql AS \
         $$ BEGIN RAISE EXCEPTION 'injected fault'; END $$",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER payment_insert_fault BEFORE INSERT ON payment_transactions \
         FOR EACH ROW EXECUTE FUNCTION reject_payment_insert()",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = checkout::place_order(
        State(s),
        Path("sess-1".to_string()),
        Json(checkout_request(&catalog)),
    )
    .await;

    assert!(matches!(result, Err(ApiError::Database(_))));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM orders").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM order_items").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cart_items").await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_checkouts_place_exactly_one_order(pool: PgPool) {
    let s = state(&pool);
    let catalog = seed_checkoutable_catalog(&pool).await;
    let widget = seed_product(&pool, "10.00", 250).await;
    seed_cart_line(&pool, "sess-1", widget, 2, "10.00").await;

    let first = checkout::place_order(
        State(s.clone()),
        Path("sess-1".to_string()),
        Json(checkout_request(&catalog)),
    );
    let second = checkout::place_order(
        State(s),
        Path("sess-1".to_string()),
        Json(checkout_request(&catalog)),
    );
    let (a, b) = tokio::join!(first, second);

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let failure = if a.is_err() { a.err() } else { b.err() };
    assert!(matches!(failure, Some(ApiError::Validation(ref m)) if m.contains("cart is empty")));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM orders").await, 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cart_items").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn payment_transitions_enforced(pool: PgPool) {
    let s = state(&pool);
    let catalog = seed_checkoutable_catalog(&pool).await;
    let widget = seed_product(&pool, "10.00", 250).await;
    seed_cart_line(&pool, "sess-1", widget, 1, "10.00").await;
    checkout::place_order(
        State(s.clone()),
        Path("sess-1".to_string()),
        Json(checkout_request(&catalog)),
    )
    .await
    .unwrap();
    let (payment_id,): (Uuid,) = sqlx::query_as("SELECT id FROM payment_transactions")
        .fetch_one(&pool)
        .await
        .unwrap();

    let update = |status: &str| PaymentUpdateRequest {
        status: status.into(),
        provider_transaction_id: Some("prov-123".into()),
    };

    // Unknown or backwards targets are conflicts, not validation errors.
    let result = checkout::update_payment(State(s.clone()), Path(payment_id), Json(update("pending"))).await;
    assert!(matches!(result, Err(ApiError::Conflict(_))));
    let result = checkout::update_payment(State(s.clone()), Path(payment_id), Json(update("garbage"))).await;
    assert!(matches!(result, Err(ApiError::Conflict(_))));

    checkout::update_payment(State(s.clone()), Path(payment_id), Json(update("completed")))
        .await
        .unwrap();
    let (order_status,): (String,) = sqlx::query_as("SELECT payment_status FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(order_status, "paid");

    let result = checkout::update_payment(State(s.clone()), Path(payment_id), Json(update("completed"))).await;
    assert!(matches!(result, Err(ApiError::Conflict(_))));

    checkout::update_payment(State(s), Path(payment_id), Json(update("refunded")))
        .await
        .unwrap();
    let (order_status,): (String,) = sqlx::query_as("SELECT status FROM orders").fetch_one(&pool).await.unwrap();
    assert_eq!(order_status, "refunded");
}
