//! Shipping gateways (carriers)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::normalize_code;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShippingGateway {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub gateway_type: String,
    pub status: String,
    /// Opaque provider configuration; never interpreted by rate logic.
    pub api_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct GatewayRequest {
    pub code: String,
    pub name: String,
    pub gateway_type: Option<String>,
    pub status: Option<String>,
    pub api_config: Option<serde_json::Value>,
}

fn validate_gateway_type(t: &str) -> Result<(), ApiError> {
    match t {
        "manual" | "api" | "hybrid" => Ok(()),
        other => Err(ApiError::validation(format!("invalid gateway_type: {other:?}"))),
    }
}

fn validate_status(status: &str) -> Result<(), ApiError> {
    match status {
        "active" | "inactive" => Ok(()),
        other => Err(ApiError::validation(format!("invalid status: {other:?}"))),
    }
}

pub async fn list_gateways(State(s): State<AppState>) -> ApiResult<Json<Vec<ShippingGateway>>> {
    let gateways = sqlx::query_as::<_, ShippingGateway>("SELECT * FROM shipping_gateways ORDER BY code")
        .fetch_all(&s.db)
        .await?;
    Ok(Json(gateways))
}

pub async fn get_gateway(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ShippingGateway>> {
    sqlx::query_as::<_, ShippingGateway>("SELECT * FROM shipping_gateways WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("gateway"))
}

pub async fn create_gateway(
    State(s): State<AppState>,
    Json(r): Json<GatewayRequest>,
) -> ApiResult<(StatusCode, Json<ShippingGateway>)> {
    let code = normalize_code(&r.code)?;
    let gateway_type = r.gateway_type.unwrap_or_else(|| "manual".into());
    validate_gateway_type(&gateway_type)?;
    let status = r.status.unwrap_or_else(|| "active".into());
    validate_status(&status)?;

    let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM shipping_gateways WHERE code = $1")
        .bind(&code)
        .fetch_optional(&s.db)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict(format!("gateway code {code} already exists")));
    }

    let gw = sqlx::query_as::<_, ShippingGateway>(
        "INSERT INTO shipping_gateways (id, code, name, gateway_type, status, api_config) VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&code)
    .bind(&r.name)
    .bind(&gateway_type)
    .bind(&status)
    .bind(r.api_config.unwrap_or_else(|| serde_json::json!({})))
    .fetch_one(&s.db)
    .await?;
    tracing::info!(gateway = %gw.code, "gateway created");
    Ok((StatusCode::CREATED, Json(gw)))
}

pub async fn update_gateway(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<GatewayRequest>,
) -> ApiResult<Json<ShippingGateway>> {
    let code = normalize_code(&r.code)?;
    let gateway_type = r.gateway_type.unwrap_or_else(|| "manual".into());
    validate_gateway_type(&gateway_type)?;
    let status = r.status.unwrap_or_else(|| "active".into());
    validate_status(&status)?;

    let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM shipping_gateways WHERE code = $1 AND id <> $2")
        .bind(&code)
        .bind(id)
        .fetch_optional(&s.db)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict(format!("gateway code {code} already exists")));
    }

    let gw = sqlx::query_as::<_, ShippingGateway>(
        "UPDATE shipping_gateways SET code = $2, name = $3, gateway_type = $4, status = $5, api_config = COALESCE($6, api_config), updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&code)
    .bind(&r.name)
    .bind(&gateway_type)
    .bind(&status)
    .bind(r.api_config)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("gateway"))?;
    Ok(Json(gw))
}

pub async fn delete_gateway(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let (methods,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shipping_methods WHERE gateway_id = $1")
        .bind(id)
        .fetch_one(&s.db)
        .await?;
    let (links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM zone_gateways WHERE gateway_id = $1")
        .bind(id)
        .fetch_one(&s.db)
        .await?;
    if methods > 0 || links > 0 {
        return Err(ApiError::conflict(format!(
            "gateway is in use: {methods} method(s), {links} zone link(s)"
        )));
    }

    let deleted = sqlx::query("DELETE FROM shipping_gateways WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("gateway"));
    }
    Ok(StatusCode::NO_CONTENT)
}
