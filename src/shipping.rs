//! Quote phase: zone resolution and shipping-cost quotes
//!
//! Read-only and idempotent. No coverage means an empty list, not an error.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::cart::cart_summary;
use crate::catalog::methods::ShippingMethod;
use crate::catalog::normalize_country;
use crate::catalog::zones::ShippingZone;
use crate::domain::{
    calculate_cost, cheapest, currency_summary, sort_rated, CurrencySummary, MethodType, RateOutcome, RatedMethod,
};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Active zones covering a country, ordered by priority ascending.
pub async fn resolve_zones_for_country(db: &sqlx::PgPool, country_code: &str) -> Result<Vec<ShippingZone>, sqlx::Error> {
    sqlx::query_as::<_, ShippingZone>(
        "SELECT z.* FROM shipping_zones z \
         JOIN zone_countries zc ON zc.zone_id = z.id \
         WHERE zc.country_code = $1 AND z.status = 'active' \
         ORDER BY z.priority, z.code",
    )
    .bind(country_code)
    .fetch_all(db)
    .await
}

/// Active method in an active zone covering the country, through an
/// available link to an active gateway.
#[derive(Debug, sqlx::FromRow)]
pub struct MethodCandidate {
    #[sqlx(flatten)]
    pub method: ShippingMethod,
    pub zone_code: String,
    pub gateway_name: String,
}

async fn eligible_methods(
    db: &sqlx::PgPool,
    country_code: &str,
    zone_id: Option<Uuid>,
    gateway_id: Option<Uuid>,
) -> Result<Vec<MethodCandidate>, sqlx::Error> {
    sqlx::query_as::<_, MethodCandidate>(
        "SELECT m.*, z.code AS zone_code, g.name AS gateway_name \
         FROM shipping_methods m \
         JOIN shipping_zones z ON z.id = m.zone_id AND z.status = 'active' \
         JOIN zone_countries zc ON zc.zone_id = z.id AND zc.country_code = $1 \
         JOIN zone_gateways zg ON zg.zone_id = m.zone_id AND zg.gateway_id = m.gateway_id AND zg.is_available \
         JOIN shipping_gateways g ON g.id = m.gateway_id AND g.status = 'active' \
         WHERE m.status = 'active' \
           AND ($2::uuid IS NULL OR m.zone_id = $2) \
           AND ($3::uuid IS NULL OR m.gateway_id = $3) \
         ORDER BY z.priority, zg.priority, m.sort_order, m.name",
    )
    .bind(country_code)
    .bind(zone_id)
    .bind(gateway_id)
    .fetch_all(db)
    .await
}

/// Rate every candidate, dropping inapplicable ones; offers come back
/// sorted ascending by cost.
fn rate_candidates(candidates: Vec<MethodCandidate>, subtotal: Decimal, weight_g: i64) -> Vec<RatedMethod> {
    let mut rated = Vec::with_capacity(candidates.len());
    for c in candidates {
        let cfg = match c.method.rate_config() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(method = %c.method.id, %err, "skipping method with bad config");
                continue;
            }
        };
        match calculate_cost(&cfg, subtotal, weight_g) {
            RateOutcome::Cost(cost) => rated.push(RatedMethod {
                method_id: c.method.id,
                name: c.method.name,
                gateway_name: c.gateway_name,
                zone_code: c.zone_code,
                method_type: cfg.method_type,
                cost,
                currency: c.method.currency,
                estimated_days_min: c.method.estimated_days_min,
                estimated_days_max: c.method.estimated_days_max,
                sort_order: c.method.sort_order,
            }),
            RateOutcome::NotApplicable => {}
        }
    }
    sort_rated(&mut rated);
    rated
}

#[derive(Debug, Deserialize)]
pub struct OptionsQuery {
    pub country_code: String,
}

/// Which active zones cover a country, in priority order.
pub async fn zone_coverage(
    State(s): State<AppState>,
    Query(q): Query<OptionsQuery>,
) -> ApiResult<Json<Vec<ShippingZone>>> {
    let country = normalize_country(&q.country_code)?;
    let zones = resolve_zones_for_country(&s.db, &country).await?;
    Ok(Json(zones))
}

/// Storefront shipping options for the caller's session cart.
pub async fn shipping_options(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Query(q): Query<OptionsQuery>,
) -> ApiResult<Json<Vec<RatedMethod>>> {
    let country = normalize_country(&q.country_code)?;
    let summary = cart_summary(&s.db, &session).await?;
    let candidates = eligible_methods(&s.db, &country, None, None).await?;
    Ok(Json(rate_candidates(candidates, summary.subtotal, summary.total_weight_g)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CalculateRequest {
    pub country_code: String,
    pub cart_total: Decimal,
    #[validate(range(min = 0))]
    pub total_weight_g: i64,
    pub zone_id: Option<Uuid>,
    pub gateway_id: Option<Uuid>,
    pub method_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    pub country_code: String,
    pub matches: Vec<RatedMethod>,
    pub cheapest: Option<RatedMethod>,
    pub currencies: Vec<CurrencySummary>,
}

/// Admin calculator tool: rate a hypothetical cart against the catalog.
pub async fn calculate_rates(
    State(s): State<AppState>,
    Json(r): Json<CalculateRequest>,
) -> ApiResult<Json<CalculateResponse>> {
    r.validate()
        .map_err(|e| ApiError::validation(format!("invalid request: {e}")))?;
    if r.cart_total < Decimal::ZERO {
        return Err(ApiError::validation("cart_total must not be negative"));
    }
    let type_filter = match r.method_type.as_deref() {
        Some(raw) => Some(
            MethodType::parse(raw).ok_or_else(|| ApiError::validation(format!("invalid method_type: {raw:?}")))?,
        ),
        None => None,
    };

    let country = normalize_country(&r.country_code)?;
    let candidates = eligible_methods(&s.db, &country, r.zone_id, r.gateway_id).await?;
    let mut matches = rate_candidates(candidates, r.cart_total, r.total_weight_g);
    if let Some(t) = type_filter {
        matches.retain(|m| m.method_type == t);
    }

    let cheapest = cheapest(&matches).cloned();
    let currencies = currency_summary(&matches);
    Ok(Json(CalculateResponse { country_code: country, matches, cheapest, currencies }))
}
