//! Checkout Orchestrator
//!
//! One transaction per attempt; every early return before `commit` drops
//! the transaction and sqlx rolls it back.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cart::{lock_lines, CartLine};
use crate::catalog::methods::ShippingMethod;
use crate::domain::{calculate_cost, RateOutcome};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub session_id: String,
    pub status: String,
    pub payment_status: String,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_method_id: Uuid,
    pub payment_method_id: Uuid,
    // Name snapshots; catalog renames never rewrite order history.
    pub shipping_method_name: String,
    pub gateway_name: String,
    pub payment_method_name: String,
    pub shipping_address: serde_json::Value,
    pub billing_address: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub provider_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct MethodForCheckout {
    #[sqlx(flatten)]
    method: ShippingMethod,
    gateway_name: String,
    gateway_status: String,
    link_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_method_id: Uuid,
    pub payment_method_id: Uuid,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub total_amount: Decimal,
    pub currency: String,
}

fn subtotal_of(lines: &[CartLine]) -> Decimal {
    lines.iter().map(|l| l.price_at_add * Decimal::from(l.quantity)).sum()
}

fn weight_of(lines: &[CartLine]) -> i64 {
    lines.iter().map(|l| i64::from(l.unit_weight_g) * i64::from(l.quantity)).sum()
}

pub async fn place_order(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutResponse>)> {
    if !r.shipping_address.is_object() {
        return Err(ApiError::validation("shipping_address must be an object"));
    }

    let mut tx = s.db.begin().await?;

    // Read and lock the cart inside the transaction: the lines priced here
    // are exactly the lines cleared below.
    let lines = lock_lines(&mut *tx, &session).await?;
    if lines.is_empty() {
        return Err(ApiError::validation("cart is empty, nothing to check out"));
    }

    let payment: Option<(String, bool)> =
        sqlx::query_as("SELECT name, is_enabled FROM payment_methods WHERE id = $1")
            .bind(r.payment_method_id)
            .fetch_optional(&mut *tx)
            .await?;
    let (payment_method_name, enabled) = payment.ok_or(ApiError::NotFound("payment method"))?;
    if !enabled {
        return Err(ApiError::validation("payment method is disabled"));
    }

    let found: Option<MethodForCheckout> = sqlx::query_as(
        "SELECT m.*, g.name AS gateway_name, g.status AS gateway_status, zg.is_available AS link_available \
         FROM shipping_methods m \
         JOIN shipping_gateways g ON g.id = m.gateway_id \
         LEFT JOIN zone_gateways zg ON zg.zone_id = m.zone_id AND zg.gateway_id = m.gateway_id \
         WHERE m.id = $1",
    )
    .bind(r.shipping_method_id)
    .fetch_optional(&mut *tx)
    .await?;
    let chosen = found.ok_or(ApiError::NotFound("shipping method"))?;
    if chosen.method.status != "active" {
        return Err(ApiError::validation("shipping method is disabled"));
    }
    if chosen.gateway_status != "active" {
        return Err(ApiError::validation("shipping gateway is disabled"));
    }
    if chosen.link_available != Some(true) {
        return Err(ApiError::validation("shipping method is not available for its zone"));
    }

    // Cost is recomputed server-side, never taken from the client.
    let subtotal = subtotal_of(&lines);
    let weight_g = weight_of(&lines);
    let cfg = chosen.method.rate_config()?;
    let shipping_cost = match calculate_cost(&cfg, subtotal, weight_g) {
        RateOutcome::Cost(cost) => cost,
        RateOutcome::NotApplicable => {
            return Err(ApiError::validation(
                "shipping method is not applicable to this cart (weight or subtotal out of range)",
            ));
        }
    };
    let total = subtotal + shipping_cost;

    let order_id = Uuid::new_v4();
    let order_number = format!("ORD-{:08}", rand::random::<u32>() % 100_000_000);
    sqlx::query(
        "INSERT INTO orders (id, order_number, session_id, status, payment_status, subtotal, shipping_cost, total, \
         currency, shipping_method_id, payment_method_id, shipping_method_name, gateway_name, payment_method_name, \
         shipping_address, billing_address) \
         VALUES ($1, $2, $3, 'pending', 'pending', $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(order_id)
    .bind(&order_number)
    .bind(&session)
    .bind(subtotal)
    .bind(shipping_cost)
    .bind(total)
    .bind(&chosen.method.currency)
    .bind(r.shipping_method_id)
    .bind(r.payment_method_id)
    .bind(&chosen.method.name)
    .bind(&chosen.gateway_name)
    .bind(&payment_method_name)
    .bind(&r.shipping_address)
    .bind(r.billing_address.unwrap_or_else(|| serde_json::json!({})))
    .execute(&mut *tx)
    .await?;

    for line in &lines {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, variant_id, name, quantity, unit_price, total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(&line.name)
        .bind(line.quantity)
        .bind(line.price_at_add)
        .bind(line.price_at_add * Decimal::from(line.quantity))
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "INSERT INTO payment_transactions (id, order_id, amount, currency, status) VALUES ($1, $2, $3, $4, 'pending')",
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(total)
    .bind(&chosen.method.currency)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(&session)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(order = %order_number, %total, "order placed");

    if let Some(nats) = &s.nats {
        let event = serde_json::json!({
            "order_id": order_id,
            "order_number": order_number,
            "total": total,
            "currency": chosen.method.currency,
        });
        if let Err(err) = nats.publish("orders.placed", event.to_string().into()).await {
            tracing::warn!(%err, "failed to publish order event");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id,
            order_number,
            total_amount: total,
            currency: chosen.method.currency,
        }),
    ))
}

// ============================================================================
// Payment transaction status path (driven by the external payment adapter)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PaymentUpdateRequest {
    pub status: String,
    pub provider_transaction_id: Option<String>,
}

fn transition_allowed(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("pending", "completed") | ("pending", "failed") | ("completed", "refunded")
    )
}

/// Order-side projection of a payment transition.
fn order_update_for(status: &str) -> Option<(&'static str, &'static str)> {
    match status {
        "completed" => Some(("paid", "processing")),
        "failed" => Some(("failed", "pending")),
        "refunded" => Some(("refunded", "refunded")),
        _ => None,
    }
}

pub async fn update_payment(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<PaymentUpdateRequest>,
) -> ApiResult<Json<PaymentTransaction>> {
    let (payment_status, order_status) = order_update_for(&r.status)
        .ok_or_else(|| ApiError::conflict(format!("illegal payment transition to {:?}", r.status)))?;

    let mut tx = s.db.begin().await?;
    let current: Option<(String, Uuid)> =
        sqlx::query_as("SELECT status, order_id FROM payment_transactions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let (current_status, order_id) = current.ok_or(ApiError::NotFound("payment transaction"))?;
    if !transition_allowed(&current_status, &r.status) {
        return Err(ApiError::conflict(format!(
            "illegal payment transition {current_status} -> {}",
            r.status
        )));
    }

    let updated = sqlx::query_as::<_, PaymentTransaction>(
        "UPDATE payment_transactions SET status = $2, \
         provider_transaction_id = COALESCE($3, provider_transaction_id), updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&r.status)
    .bind(r.provider_transaction_id)
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query("UPDATE orders SET payment_status = $2, status = $3, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(payment_status)
        .bind(order_status)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(payment = %id, from = %current_status, to = %r.status, "payment transition");
    Ok(Json(updated))
}

// ============================================================================
// Order readback
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

pub async fn list_orders(State(s): State<AppState>) -> ApiResult<Json<Vec<Order>>> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC LIMIT 100")
        .fetch_all(&s.db)
        .await?;
    Ok(Json(orders))
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<OrderDetail>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY name")
        .bind(id)
        .fetch_all(&s.db)
        .await?;
    Ok(Json(OrderDetail { order, items }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: &str, quantity: i32, unit_weight_g: i32) -> CartLine {
        CartLine {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            variant_id: None,
            name: "Widget".into(),
            quantity,
            price_at_add: price.parse().unwrap(),
            unit_weight_g,
        }
    }

    #[test]
    fn test_cart_totals_from_captured_prices() {
        let lines = vec![line("10.00", 2, 250), line("4.50", 3, 100)];
        assert_eq!(subtotal_of(&lines), "33.50".parse().unwrap());
        assert_eq!(weight_of(&lines), 800);
    }

    #[test]
    fn test_empty_lines_total_zero() {
        assert_eq!(subtotal_of(&[]), Decimal::ZERO);
        assert_eq!(weight_of(&[]), 0);
    }

    #[test]
    fn test_payment_transitions() {
        assert!(transition_allowed("pending", "completed"));
        assert!(transition_allowed("pending", "failed"));
        assert!(transition_allowed("completed", "refunded"));
        assert!(!transition_allowed("completed", "completed"));
        assert!(!transition_allowed("failed", "completed"));
        assert!(!transition_allowed("refunded", "pending"));
    }

    #[test]
    fn test_order_projection_of_payment_status() {
        assert_eq!(order_update_for("completed"), Some(("paid", "processing")));
        assert_eq!(order_update_for("refunded"), Some(("refunded", "refunded")));
        assert_eq!(order_update_for("pending"), None);
        assert_eq!(order_update_for("garbage"), None);
    }
}
