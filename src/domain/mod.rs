//! Pure shipping domain logic (no I/O)
pub mod quote;
pub mod rates;

pub use quote::{cheapest, currency_summary, sort_rated, CurrencySummary, RatedMethod};
pub use rates::{calculate_cost, MethodType, RateConfig, RateOutcome};
