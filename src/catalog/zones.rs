//! Shipping zones and their country assignments

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{normalize_code, normalize_country};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShippingZone {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub priority: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ZoneCountry {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub country_code: String,
    pub country_name: String,
}

#[derive(Debug, Serialize)]
pub struct ZoneDetail {
    #[serde(flatten)]
    pub zone: ShippingZone,
    pub countries: Vec<ZoneCountry>,
}

#[derive(Debug, Deserialize)]
pub struct ZoneRequest {
    pub code: String,
    pub name: String,
    pub priority: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CountryAssignment {
    pub country_code: String,
    pub country_name: String,
}

fn validate_status(status: &str) -> Result<(), ApiError> {
    match status {
        "active" | "inactive" => Ok(()),
        other => Err(ApiError::validation(format!("invalid status: {other:?}"))),
    }
}

pub async fn list_zones(State(s): State<AppState>) -> ApiResult<Json<Vec<ShippingZone>>> {
    let zones = sqlx::query_as::<_, ShippingZone>("SELECT * FROM shipping_zones ORDER BY priority, code")
        .fetch_all(&s.db)
        .await?;
    Ok(Json(zones))
}

pub async fn get_zone(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ZoneDetail>> {
    let zone = sqlx::query_as::<_, ShippingZone>("SELECT * FROM shipping_zones WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(ApiError::NotFound("zone"))?;
    let countries =
        sqlx::query_as::<_, ZoneCountry>("SELECT * FROM zone_countries WHERE zone_id = $1 ORDER BY country_code")
            .bind(id)
            .fetch_all(&s.db)
            .await?;
    Ok(Json(ZoneDetail { zone, countries }))
}

pub async fn create_zone(
    State(s): State<AppState>,
    Json(r): Json<ZoneRequest>,
) -> ApiResult<(StatusCode, Json<ShippingZone>)> {
    let code = normalize_code(&r.code)?;
    let status = r.status.unwrap_or_else(|| "active".into());
    validate_status(&status)?;

    let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM shipping_zones WHERE code = $1")
        .bind(&code)
        .fetch_optional(&s.db)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict(format!("zone code {code} already exists")));
    }

    let zone = sqlx::query_as::<_, ShippingZone>(
        "INSERT INTO shipping_zones (id, code, name, priority, status) VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&code)
    .bind(&r.name)
    .bind(r.priority.unwrap_or(0))
    .bind(&status)
    .fetch_one(&s.db)
    .await?;
    tracing::info!(zone = %zone.code, "zone created");
    Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn update_zone(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<ZoneRequest>,
) -> ApiResult<Json<ShippingZone>> {
    let code = normalize_code(&r.code)?;
    let status = r.status.unwrap_or_else(|| "active".into());
    validate_status(&status)?;

    let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM shipping_zones WHERE code = $1 AND id <> $2")
        .bind(&code)
        .bind(id)
        .fetch_optional(&s.db)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict(format!("zone code {code} already exists")));
    }

    let zone = sqlx::query_as::<_, ShippingZone>(
        "UPDATE shipping_zones SET code = $2, name = $3, priority = $4, status = $5, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&code)
    .bind(&r.name)
    .bind(r.priority.unwrap_or(0))
    .bind(&status)
    .fetch_optional(&s.db)
    .await?
    .ok_or(ApiError::NotFound("zone"))?;
    Ok(Json(zone))
}

/// Guarded, never cascading; the error reports the blocking counts.
pub async fn delete_zone(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let (methods,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shipping_methods WHERE zone_id = $1")
        .bind(id)
        .fetch_one(&s.db)
        .await?;
    let (links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM zone_gateways WHERE zone_id = $1")
        .bind(id)
        .fetch_one(&s.db)
        .await?;
    if methods > 0 || links > 0 {
        return Err(ApiError::conflict(format!(
            "zone is in use: {methods} method(s), {links} gateway link(s)"
        )));
    }

    let deleted = sqlx::query("DELETE FROM shipping_zones WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("zone"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the zone's country assignments wholesale.
pub async fn set_zone_countries(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<Vec<CountryAssignment>>,
) -> ApiResult<Json<Vec<ZoneCountry>>> {
    let mut assignments = Vec::with_capacity(r.len());
    for a in &r {
        let code = normalize_country(&a.country_code)?;
        if assignments.iter().any(|(c, _)| *c == code) {
            return Err(ApiError::validation(format!("duplicate country_code {code}")));
        }
        assignments.push((code, a.country_name.clone()));
    }

    let mut tx = s.db.begin().await?;
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM shipping_zones WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound("zone"));
    }
    sqlx::query("DELETE FROM zone_countries WHERE zone_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let mut out = Vec::with_capacity(assignments.len());
    for (code, name) in assignments {
        let row = sqlx::query_as::<_, ZoneCountry>(
            "INSERT INTO zone_countries (id, zone_id, country_code, country_name) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(&code)
        .bind(&name)
        .fetch_one(&mut *tx)
        .await?;
        out.push(row);
    }
    tx.commit().await?;
    Ok(Json(out))
}
