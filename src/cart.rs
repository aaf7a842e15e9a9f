//! Session carts and the cart aggregator
//!
//! `price_at_add` is captured when a line is created and is the canonical
//! price for every downstream total.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub session_id: String,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub price_at_add: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Cart line joined with display name and effective unit weight
/// (variant weight falling back to product weight).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub price_at_add: Decimal,
    pub unit_weight_g: i32,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartSummary {
    pub subtotal: Decimal,
    pub total_weight_g: i64,
    pub line_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    #[serde(flatten)]
    pub summary: CartSummary,
}

const LINES_SQL: &str = "SELECT ci.id, ci.product_id, ci.variant_id, \
     CASE WHEN v.id IS NULL THEN p.name ELSE p.name || ' - ' || v.name END AS name, \
     ci.quantity, ci.price_at_add, COALESCE(v.weight_g, p.weight_g) AS unit_weight_g \
     FROM cart_items ci \
     JOIN products p ON p.id = ci.product_id \
     LEFT JOIN product_variants v ON v.id = ci.variant_id \
     WHERE ci.session_id = $1 ORDER BY ci.created_at";

/// Subtotal and total weight for a session's cart.
pub async fn cart_summary<'e, E>(db: E, session_id: &str) -> Result<CartSummary, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, CartSummary>(
        "SELECT COALESCE(SUM(ci.price_at_add * ci.quantity), 0) AS subtotal, \
         COALESCE(SUM(COALESCE(v.weight_g, p.weight_g)::BIGINT * ci.quantity), 0)::BIGINT AS total_weight_g, \
         COUNT(*) AS line_count \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         LEFT JOIN product_variants v ON v.id = ci.variant_id \
         WHERE ci.session_id = $1",
    )
    .bind(session_id)
    .fetch_one(db)
    .await
}

pub async fn fetch_lines<'e, E>(db: E, session_id: &str) -> Result<Vec<CartLine>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, CartLine>(LINES_SQL).bind(session_id).fetch_all(db).await
}

/// Same lines, but locked against the caller's transaction. A concurrent
/// checkout for the same session blocks here and re-reads after the first
/// commit, finding the cart already cleared.
pub async fn lock_lines(conn: &mut sqlx::PgConnection, session_id: &str) -> Result<Vec<CartLine>, sqlx::Error> {
    let sql = format!("{LINES_SQL} FOR UPDATE OF ci");
    sqlx::query_as::<_, CartLine>(&sql).bind(session_id).fetch_all(conn).await
}

pub async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CartView>> {
    let items = fetch_lines(&s.db, &session).await?;
    let summary = cart_summary(&s.db, &session).await?;
    Ok(Json(CartView { items, summary }))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

pub async fn add_item(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<AddItemRequest>,
) -> ApiResult<(StatusCode, Json<CartItem>)> {
    if r.quantity <= 0 {
        return Err(ApiError::validation("quantity must be positive"));
    }

    let product: Option<(Decimal, String)> = sqlx::query_as("SELECT price, status FROM products WHERE id = $1")
        .bind(r.product_id)
        .fetch_optional(&s.db)
        .await?;
    let (product_price, status) = product.ok_or(ApiError::NotFound("product"))?;
    if status != "active" {
        return Err(ApiError::validation("product is not available"));
    }

    // Variant price wins when a variant is chosen.
    let price_at_add = match r.variant_id {
        Some(variant_id) => {
            let variant: Option<(Decimal,)> =
                sqlx::query_as("SELECT price FROM product_variants WHERE id = $1 AND product_id = $2")
                    .bind(variant_id)
                    .bind(r.product_id)
                    .fetch_optional(&s.db)
                    .await?;
            variant.ok_or(ApiError::NotFound("variant"))?.0
        }
        None => product_price,
    };

    let item = sqlx::query_as::<_, CartItem>(
        "INSERT INTO cart_items (id, session_id, product_id, variant_id, quantity, price_at_add) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (session_id, product_id, COALESCE(variant_id, '00000000-0000-0000-0000-000000000000'::uuid)) \
         DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity \
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&session)
    .bind(r.product_id)
    .bind(r.variant_id)
    .bind(r.quantity)
    .bind(price_at_add)
    .fetch_one(&s.db)
    .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

pub async fn update_item(
    State(s): State<AppState>,
    Path((session, item_id)): Path<(String, Uuid)>,
    Json(r): Json<UpdateItemRequest>,
) -> ApiResult<Json<Option<CartItem>>> {
    if r.quantity < 0 {
        return Err(ApiError::validation("quantity must not be negative"));
    }
    if r.quantity == 0 {
        let deleted = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND session_id = $2")
            .bind(item_id)
            .bind(&session)
            .execute(&s.db)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(ApiError::NotFound("cart item"));
        }
        return Ok(Json(None));
    }
    let item = sqlx::query_as::<_, CartItem>(
        "UPDATE cart_items SET quantity = $3 WHERE id = $1 AND session_id = $2 RETURNING *",
    )
    .bind(item_id)
    .bind(&session)
    .bind(r.quantity)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("cart item"))?;
    Ok(Json(Some(item)))
}

pub async fn remove_item(
    State(s): State<AppState>,
    Path((session, item_id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    let deleted = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND session_id = $2")
        .bind(item_id)
        .bind(&session)
        .execute(&s.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("cart item"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<StatusCode> {
    sqlx::query("DELETE FROM cart_items WHERE session_id = $1")
        .bind(&session)
        .execute(&s.db)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
