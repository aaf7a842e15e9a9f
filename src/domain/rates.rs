//! Rate Calculator
//!
//! Pure cost computation. `Cost(0)` (free) and `NotApplicable` (excluded
//! from offers) are distinct outcomes and must stay that way.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    #[default]
    Flat,
    WeightBased,
    FreeShipping,
    Percentage,
}

impl MethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::WeightBased => "weight_based",
            Self::FreeShipping => "free_shipping",
            Self::Percentage => "percentage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(Self::Flat),
            "weight_based" => Some(Self::WeightBased),
            "free_shipping" => Some(Self::FreeShipping),
            "percentage" => Some(Self::Percentage),
            _ => None,
        }
    }
}

/// Numeric configuration of a method. Missing cost-like fields default to
/// zero; `None` in the limit fields means unbounded.
#[derive(Clone, Debug, Default)]
pub struct RateConfig {
    pub method_type: MethodType,
    pub base_cost: Option<Decimal>,
    pub cost_per_kg: Option<Decimal>,
    pub weight_threshold_g: Option<i64>,
    pub min_free_threshold: Option<Decimal>,
    pub max_free_weight_g: Option<i64>,
    pub max_weight_limit_g: Option<i64>,
    pub percentage_rate: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateOutcome {
    Cost(Decimal),
    NotApplicable,
}

impl RateOutcome {
    pub fn cost(&self) -> Option<Decimal> {
        match self {
            Self::Cost(c) => Some(*c),
            Self::NotApplicable => None,
        }
    }
}

/// Compute the shipping cost for one method, or rule it out.
/// `weight_g` is total cart weight in grams.
pub fn calculate_cost(cfg: &RateConfig, subtotal: Decimal, weight_g: i64) -> RateOutcome {
    // Hard weight cap applies to every method type.
    if let Some(limit) = cfg.max_weight_limit_g {
        if weight_g > limit {
            return RateOutcome::NotApplicable;
        }
    }

    let base = cfg.base_cost.unwrap_or(Decimal::ZERO);
    match cfg.method_type {
        MethodType::Flat => RateOutcome::Cost(clamp(base)),
        MethodType::WeightBased => {
            let threshold = cfg.weight_threshold_g.unwrap_or(0);
            let billable_g = (weight_g - threshold).max(0);
            let per_kg = cfg.cost_per_kg.unwrap_or(Decimal::ZERO);
            let cost = base + per_kg * Decimal::from(billable_g) / Decimal::from(1000);
            RateOutcome::Cost(clamp(cost.round_dp(2)))
        }
        MethodType::FreeShipping => {
            let min_subtotal = cfg.min_free_threshold.unwrap_or(Decimal::ZERO);
            let within_weight = cfg.max_free_weight_g.map_or(true, |max| weight_g <= max);
            if subtotal >= min_subtotal && within_weight {
                RateOutcome::Cost(Decimal::ZERO)
            } else {
                RateOutcome::NotApplicable
            }
        }
        MethodType::Percentage => {
            let rate = cfg.percentage_rate.unwrap_or(Decimal::ZERO);
            let cost = subtotal * rate / Decimal::from(100);
            RateOutcome::Cost(clamp(cost.round_dp(2)))
        }
    }
}

fn clamp(cost: Decimal) -> Decimal {
    cost.max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn flat(base: &str, limit: Option<i64>) -> RateConfig {
        RateConfig {
            method_type: MethodType::Flat,
            base_cost: Some(base.parse().unwrap()),
            max_weight_limit_g: limit,
            ..Default::default()
        }
    }

    fn weight_based(base: &str, per_kg: &str, threshold_g: i64, limit: Option<i64>) -> RateConfig {
        RateConfig {
            method_type: MethodType::WeightBased,
            base_cost: Some(base.parse().unwrap()),
            cost_per_kg: Some(per_kg.parse().unwrap()),
            weight_threshold_g: Some(threshold_g),
            max_weight_limit_g: limit,
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_ignores_weight_and_subtotal() {
        let cfg = flat("5.00", None);
        assert_eq!(calculate_cost(&cfg, dec("0"), 0), RateOutcome::Cost(dec("5.00")));
        assert_eq!(calculate_cost(&cfg, dec("999"), 50_000), RateOutcome::Cost(dec("5.00")));
    }

    #[test]
    fn test_flat_excluded_over_weight_limit() {
        let cfg = flat("5.00", Some(10_000));
        assert_eq!(calculate_cost(&cfg, dec("10"), 10_000), RateOutcome::Cost(dec("5.00")));
        assert_eq!(calculate_cost(&cfg, dec("10"), 10_001), RateOutcome::NotApplicable);
    }

    #[test]
    fn test_weight_based_constant_at_or_below_threshold() {
        let cfg = weight_based("4.00", "2.50", 1000, None);
        assert_eq!(calculate_cost(&cfg, dec("0"), 0), RateOutcome::Cost(dec("4.00")));
        assert_eq!(calculate_cost(&cfg, dec("0"), 1000), RateOutcome::Cost(dec("4.00")));
    }

    #[test]
    fn test_weight_based_bills_per_kg_above_threshold() {
        let cfg = weight_based("4.00", "2.50", 1000, None);
        // 1500g over threshold = 1.5kg * 2.50 = 3.75
        assert_eq!(calculate_cost(&cfg, dec("0"), 2500), RateOutcome::Cost(dec("7.75")));
    }

    #[test]
    fn test_weight_based_monotone_above_threshold() {
        let cfg = weight_based("4.00", "2.50", 1000, None);
        let mut last = Decimal::ZERO;
        for w in (1000..=20_000).step_by(500) {
            let cost = calculate_cost(&cfg, dec("0"), w).cost().unwrap();
            assert!(cost >= last, "cost regressed at {}g", w);
            last = cost;
        }
    }

    #[test]
    fn test_weight_based_excluded_over_limit() {
        let cfg = weight_based("4.00", "2.50", 1000, Some(5000));
        assert!(calculate_cost(&cfg, dec("0"), 5000).cost().is_some());
        assert_eq!(calculate_cost(&cfg, dec("0"), 5001), RateOutcome::NotApplicable);
    }

    #[test]
    fn test_free_shipping_zero_when_qualified() {
        let cfg = RateConfig {
            method_type: MethodType::FreeShipping,
            min_free_threshold: Some(dec("50")),
            max_free_weight_g: Some(10_000),
            ..Default::default()
        };
        assert_eq!(calculate_cost(&cfg, dec("50"), 10_000), RateOutcome::Cost(Decimal::ZERO));
        assert_eq!(calculate_cost(&cfg, dec("75"), 500), RateOutcome::Cost(Decimal::ZERO));
    }

    #[test]
    fn test_free_shipping_excluded_not_charged_when_unqualified() {
        let cfg = RateConfig {
            method_type: MethodType::FreeShipping,
            min_free_threshold: Some(dec("50")),
            max_free_weight_g: Some(10_000),
            ..Default::default()
        };
        // Never falls back to a paid rate.
        assert_eq!(calculate_cost(&cfg, dec("49.99"), 500), RateOutcome::NotApplicable);
        assert_eq!(calculate_cost(&cfg, dec("100"), 10_001), RateOutcome::NotApplicable);
    }

    #[test]
    fn test_percentage_of_subtotal() {
        let cfg = RateConfig {
            method_type: MethodType::Percentage,
            percentage_rate: Some(dec("7.5")),
            ..Default::default()
        };
        assert_eq!(calculate_cost(&cfg, dec("200"), 100), RateOutcome::Cost(dec("15.00")));
        assert_eq!(calculate_cost(&cfg, dec("0"), 100), RateOutcome::Cost(Decimal::ZERO));
    }

    #[test]
    fn test_misconfigured_fields_default_to_zero() {
        // A method with no numeric config quotes as free rather than
        // erroring, so "misconfigured" looks the same as "intentionally
        // free". Pinned here.
        for mt in [MethodType::Flat, MethodType::WeightBased, MethodType::Percentage] {
            let cfg = RateConfig { method_type: mt, ..Default::default() };
            assert_eq!(calculate_cost(&cfg, dec("120"), 3000), RateOutcome::Cost(Decimal::ZERO));
        }
        // Free shipping with no thresholds is always applicable.
        let cfg = RateConfig { method_type: MethodType::FreeShipping, ..Default::default() };
        assert_eq!(calculate_cost(&cfg, dec("0"), 999_999), RateOutcome::Cost(Decimal::ZERO));
    }

    #[test]
    fn test_negative_config_never_yields_negative_cost() {
        let cfg = RateConfig {
            method_type: MethodType::Flat,
            base_cost: Some(dec("-3")),
            ..Default::default()
        };
        assert_eq!(calculate_cost(&cfg, dec("10"), 100), RateOutcome::Cost(Decimal::ZERO));
    }

    #[test]
    fn test_method_type_round_trip() {
        for s in ["flat", "weight_based", "free_shipping", "percentage"] {
            assert_eq!(MethodType::parse(s).unwrap().as_str(), s);
        }
        assert!(MethodType::parse("carrier_pigeon").is_none());
    }
}
