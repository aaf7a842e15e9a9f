//! Quote assembly
//!
//! Ordering is fully deterministic (cost, sort_order, method id) so
//! repeated quotes over an unchanged catalog serialize identically.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::rates::MethodType;

/// One applicable method with its computed cost, ready to offer.
#[derive(Clone, Debug, Serialize)]
pub struct RatedMethod {
    pub method_id: Uuid,
    pub name: String,
    pub gateway_name: String,
    pub zone_code: String,
    pub method_type: MethodType,
    pub cost: Decimal,
    pub currency: String,
    pub estimated_days_min: i32,
    pub estimated_days_max: i32,
    #[serde(skip)]
    pub sort_order: i32,
}

/// Sort ascending by cost; ties broken by sort_order then method id.
pub fn sort_rated(rated: &mut [RatedMethod]) {
    rated.sort_by(|a, b| {
        a.cost
            .cmp(&b.cost)
            .then(a.sort_order.cmp(&b.sort_order))
            .then(a.method_id.cmp(&b.method_id))
    });
}

/// The single cheapest offer. Cost wins over zone priority: a 3.00 method
/// in a lower-priority zone beats a 5.00 method in the preferred zone.
pub fn cheapest(rated: &[RatedMethod]) -> Option<&RatedMethod> {
    rated.iter().min_by(|a, b| {
        a.cost
            .cmp(&b.cost)
            .then(a.sort_order.cmp(&b.sort_order))
            .then(a.method_id.cmp(&b.method_id))
    })
}

#[derive(Clone, Debug, Serialize)]
pub struct CurrencySummary {
    pub currency: String,
    pub count: usize,
    pub min_cost: Decimal,
    pub max_cost: Decimal,
    pub has_free_option: bool,
}

/// Per-currency roll-up, sorted by currency code.
pub fn currency_summary(rated: &[RatedMethod]) -> Vec<CurrencySummary> {
    let mut out: Vec<CurrencySummary> = Vec::new();
    for r in rated {
        match out.iter_mut().find(|s| s.currency == r.currency) {
            Some(s) => {
                s.count += 1;
                s.min_cost = s.min_cost.min(r.cost);
                s.max_cost = s.max_cost.max(r.cost);
                s.has_free_option |= r.cost == Decimal::ZERO;
            }
            None => out.push(CurrencySummary {
                currency: r.currency.clone(),
                count: 1,
                min_cost: r.cost,
                max_cost: r.cost,
                has_free_option: r.cost == Decimal::ZERO,
            }),
        }
    }
    out.sort_by(|a, b| a.currency.cmp(&b.currency));
    out
}
