//! Zone-gateway compatibility matrix
//!
//! Methods may only exist for a pair whose link has `is_available = true`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ZoneGateway {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub gateway_id: Uuid,
    pub is_available: bool,
    pub priority: i32,
}

/// Link joined with gateway identity for admin listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ZoneGatewayView {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub gateway_id: Uuid,
    pub gateway_code: String,
    pub gateway_name: String,
    pub is_available: bool,
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub gateway_id: Uuid,
    pub is_available: Option<bool>,
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct LinkUpdateRequest {
    pub is_available: Option<bool>,
    pub priority: Option<i32>,
}

pub async fn list_zone_gateways(
    State(s): State<AppState>,
    Path(zone_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ZoneGatewayView>>> {
    let links = sqlx::query_as::<_, ZoneGatewayView>(
        "SELECT zg.id, zg.zone_id, zg.gateway_id, g.code AS gateway_code, g.name AS gateway_name, zg.is_available, zg.priority \
         FROM zone_gateways zg JOIN shipping_gateways g ON g.id = zg.gateway_id \
         WHERE zg.zone_id = $1 ORDER BY zg.priority, g.code",
    )
    .bind(zone_id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(links))
}

pub async fn link_gateway(
    State(s): State<AppState>,
    Path(zone_id): Path<Uuid>,
    Json(r): Json<LinkRequest>,
) -> ApiResult<(StatusCode, Json<ZoneGateway>)> {
    let zone: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM shipping_zones WHERE id = $1")
        .bind(zone_id)
        .fetch_optional(&s.db)
        .await?;
    if zone.is_none() {
        return Err(ApiError::NotFound("zone"));
    }
    let gateway: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM shipping_gateways WHERE id = $1")
        .bind(r.gateway_id)
        .fetch_optional(&s.db)
        .await?;
    if gateway.is_none() {
        return Err(ApiError::NotFound("gateway"));
    }
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM zone_gateways WHERE zone_id = $1 AND gateway_id = $2")
            .bind(zone_id)
            .bind(r.gateway_id)
            .fetch_optional(&s.db)
            .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("gateway is already linked to this zone"));
    }

    let link = sqlx::query_as::<_, ZoneGateway>(
        "INSERT INTO zone_gateways (id, zone_id, gateway_id, is_available, priority) VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(zone_id)
    .bind(r.gateway_id)
    .bind(r.is_available.unwrap_or(true))
    .bind(r.priority.unwrap_or(0))
    .fetch_one(&s.db)
    .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn update_link(
    State(s): State<AppState>,
    Path((zone_id, gateway_id)): Path<(Uuid, Uuid)>,
    Json(r): Json<LinkUpdateRequest>,
) -> ApiResult<Json<ZoneGateway>> {
    let link = sqlx::query_as::<_, ZoneGateway>(
        "UPDATE zone_gateways SET is_available = COALESCE($3, is_available), priority = COALESCE($4, priority) \
         WHERE zone_id = $1 AND gateway_id = $2 RETURNING *",
    )
    .bind(zone_id)
    .bind(gateway_id)
    .bind(r.is_available)
    .bind(r.priority)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("zone-gateway link"))?;
    Ok(Json(link))
}

pub async fn unlink_gateway(
    State(s): State<AppState>,
    Path((zone_id, gateway_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let (methods,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM shipping_methods WHERE zone_id = $1 AND gateway_id = $2")
            .bind(zone_id)
            .bind(gateway_id)
            .fetch_one(&s.db)
            .await?;
    if methods > 0 {
        return Err(ApiError::conflict(format!(
            "link is in use: {methods} method(s) exist for this zone-gateway pair"
        )));
    }

    let deleted = sqlx::query("DELETE FROM zone_gateways WHERE zone_id = $1 AND gateway_id = $2")
        .bind(zone_id)
        .bind(gateway_id)
        .execute(&s.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("zone-gateway link"));
    }
    Ok(StatusCode::NO_CONTENT)
}
