//! Shipping methods (priced rules bound to one zone-gateway pair)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{MethodType, RateConfig};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShippingMethod {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub gateway_id: Uuid,
    pub name: String,
    pub method_type: String,
    pub base_cost: Option<Decimal>,
    pub cost_per_kg: Option<Decimal>,
    pub weight_threshold_g: Option<i32>,
    pub min_free_threshold: Option<Decimal>,
    pub max_free_weight_g: Option<i32>,
    pub max_weight_limit_g: Option<i32>,
    pub percentage_rate: Option<Decimal>,
    pub currency: String,
    pub estimated_days_min: i32,
    pub estimated_days_max: i32,
    pub status: String,
    pub sort_order: i32,
    // Opaque payloads, never consulted by the rate calculator.
    pub max_dimensions: serde_json::Value,
    pub restricted_items: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShippingMethod {
    /// Typed view of the numeric configuration for the rate calculator.
    pub fn rate_config(&self) -> Result<RateConfig, ApiError> {
        let method_type = MethodType::parse(&self.method_type)
            .ok_or_else(|| ApiError::validation(format!("unknown method_type {:?}", self.method_type)))?;
        Ok(RateConfig {
            method_type,
            base_cost: self.base_cost,
            cost_per_kg: self.cost_per_kg,
            weight_threshold_g: self.weight_threshold_g.map(i64::from),
            min_free_threshold: self.min_free_threshold,
            max_free_weight_g: self.max_free_weight_g.map(i64::from),
            max_weight_limit_g: self.max_weight_limit_g.map(i64::from),
            percentage_rate: self.percentage_rate,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MethodRequest {
    pub zone_id: Uuid,
    pub gateway_id: Uuid,
    pub name: String,
    pub method_type: String,
    pub base_cost: Option<Decimal>,
    pub cost_per_kg: Option<Decimal>,
    pub weight_threshold_g: Option<i32>,
    pub min_free_threshold: Option<Decimal>,
    pub max_free_weight_g: Option<i32>,
    pub max_weight_limit_g: Option<i32>,
    pub percentage_rate: Option<Decimal>,
    pub currency: Option<String>,
    pub estimated_days_min: Option<i32>,
    pub estimated_days_max: Option<i32>,
    pub status: Option<String>,
    pub sort_order: Option<i32>,
    pub max_dimensions: Option<serde_json::Value>,
    pub restricted_items: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct MethodFilter {
    pub zone_id: Option<Uuid>,
    pub gateway_id: Option<Uuid>,
}

fn validate_request(r: &MethodRequest) -> Result<(), ApiError> {
    if r.name.trim().is_empty() {
        return Err(ApiError::validation("method name must not be empty"));
    }
    if MethodType::parse(&r.method_type).is_none() {
        return Err(ApiError::validation(format!("invalid method_type: {:?}", r.method_type)));
    }
    if let Some(status) = r.status.as_deref() {
        if status != "active" && status != "inactive" {
            return Err(ApiError::validation(format!("invalid status: {status:?}")));
        }
    }
    for (field, value) in [
        ("base_cost", r.base_cost),
        ("cost_per_kg", r.cost_per_kg),
        ("min_free_threshold", r.min_free_threshold),
        ("percentage_rate", r.percentage_rate),
    ] {
        if value.is_some_and(|v| v < Decimal::ZERO) {
            return Err(ApiError::validation(format!("{field} must not be negative")));
        }
    }
    for (field, value) in [
        ("weight_threshold_g", r.weight_threshold_g),
        ("max_free_weight_g", r.max_free_weight_g),
        ("max_weight_limit_g", r.max_weight_limit_g),
    ] {
        if value.is_some_and(|v| v < 0) {
            return Err(ApiError::validation(format!("{field} must not be negative")));
        }
    }
    Ok(())
}

/// Write-time invariants: the (zone, gateway) pair must be linked and
/// available, and the name must be unique within that pair.
async fn check_invariants(
    db: &sqlx::PgPool,
    r: &MethodRequest,
    exclude_method: Option<Uuid>,
) -> Result<(), ApiError> {
    let link: Option<(bool,)> =
        sqlx::query_as("SELECT is_available FROM zone_gateways WHERE zone_id = $1 AND gateway_id = $2")
            .bind(r.zone_id)
            .bind(r.gateway_id)
            .fetch_optional(db)
            .await?;
    match link {
        None => return Err(ApiError::conflict("gateway is not linked to this zone")),
        Some((false,)) => return Err(ApiError::conflict("gateway is not available for this zone")),
        Some((true,)) => {}
    }

    let name = r.name.trim();
    let dup: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM shipping_methods WHERE zone_id = $1 AND gateway_id = $2 AND name = $3 AND id <> COALESCE($4, '00000000-0000-0000-0000-000000000000'::uuid)",
    )
    .bind(r.zone_id)
    .bind(r.gateway_id)
    .bind(name)
    .bind(exclude_method)
    .fetch_optional(db)
    .await?;
    if dup.is_some() {
        return Err(ApiError::conflict(format!(
            "duplicate method name {name:?} for this zone-gateway pair"
        )));
    }
    Ok(())
}

pub async fn list_methods(
    State(s): State<AppState>,
    Query(f): Query<MethodFilter>,
) -> ApiResult<Json<Vec<ShippingMethod>>> {
    let methods = sqlx::query_as::<_, ShippingMethod>(
        "SELECT * FROM shipping_methods \
         WHERE ($1::uuid IS NULL OR zone_id = $1) AND ($2::uuid IS NULL OR gateway_id = $2) \
         ORDER BY sort_order, name",
    )
    .bind(f.zone_id)
    .bind(f.gateway_id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(methods))
}

pub async fn get_method(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ShippingMethod>> {
    sqlx::query_as::<_, ShippingMethod>("SELECT * FROM shipping_methods WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("method"))
}

pub async fn create_method(
    State(s): State<AppState>,
    Json(r): Json<MethodRequest>,
) -> ApiResult<(StatusCode, Json<ShippingMethod>)> {
    validate_request(&r)?;
    check_invariants(&s.db, &r, None).await?;

    let method = sqlx::query_as::<_, ShippingMethod>(
        "INSERT INTO shipping_methods (id, zone_id, gateway_id, name, method_type, base_cost, cost_per_kg, \
         weight_threshold_g, min_free_threshold, max_free_weight_g, max_weight_limit_g, percentage_rate, \
         currency, estimated_days_min, estimated_days_max, status, sort_order, max_dimensions, restricted_items) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(r.zone_id)
    .bind(r.gateway_id)
    .bind(r.name.trim())
    .bind(&r.method_type)
    .bind(r.base_cost)
    .bind(r.cost_per_kg)
    .bind(r.weight_threshold_g)
    .bind(r.min_free_threshold)
    .bind(r.max_free_weight_g)
    .bind(r.max_weight_limit_g)
    .bind(r.percentage_rate)
    .bind(r.currency.as_deref().unwrap_or("USD"))
    .bind(r.estimated_days_min.unwrap_or(1))
    .bind(r.estimated_days_max.unwrap_or(7))
    .bind(r.status.as_deref().unwrap_or("active"))
    .bind(r.sort_order.unwrap_or(0))
    .bind(r.max_dimensions.unwrap_or_else(|| serde_json::json!({})))
    .bind(r.restricted_items.unwrap_or_else(|| serde_json::json!([])))
    .fetch_one(&s.db)
    .await?;
    tracing::info!(method = %method.name, zone = %method.zone_id, "method created");
    Ok((StatusCode::CREATED, Json(method)))
}

pub async fn update_method(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<MethodRequest>,
) -> ApiResult<Json<ShippingMethod>> {
    validate_request(&r)?;
    check_invariants(&s.db, &r, Some(id)).await?;

    let method = sqlx::query_as::<_, ShippingMethod>(
        "UPDATE shipping_methods SET zone_id = $2, gateway_id = $3, name = $4, method_type = $5, base_cost = $6, \
         cost_per_kg = $7, weight_threshold_g = $8, min_free_threshold = $9, max_free_weight_g = $10, \
         max_weight_limit_g = $11, percentage_rate = $12, currency = $13, estimated_days_min = $14, \
         estimated_days_max = $15, status = $16, sort_order = $17, \
         max_dimensions = COALESCE($18, max_dimensions), restricted_items = COALESCE($19, restricted_items), \
         updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(r.zone_id)
    .bind(r.gateway_id)
    .bind(r.name.trim())
    .bind(&r.method_type)
    .bind(r.base_cost)
    .bind(r.cost_per_kg)
    .bind(r.weight_threshold_g)
    .bind(r.min_free_threshold)
    .bind(r.max_free_weight_g)
    .bind(r.max_weight_limit_g)
    .bind(r.percentage_rate)
    .bind(r.currency.as_deref().unwrap_or("USD"))
    .bind(r.estimated_days_min.unwrap_or(1))
    .bind(r.estimated_days_max.unwrap_or(7))
    .bind(r.status.as_deref().unwrap_or("active"))
    .bind(r.sort_order.unwrap_or(0))
    .bind(r.max_dimensions)
    .bind(r.restricted_items)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("method"))?;
    Ok(Json(method))
}

pub async fn delete_method(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let (orders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE shipping_method_id = $1")
        .bind(id)
        .fetch_one(&s.db)
        .await?;
    if orders > 0 {
        return Err(ApiError::conflict(format!("method is referenced by {orders} order(s)")));
    }

    let deleted = sqlx::query("DELETE FROM shipping_methods WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("method"));
    }
    Ok(StatusCode::NO_CONTENT)
}
