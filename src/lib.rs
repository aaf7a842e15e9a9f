//! shipgate — shipping rate resolution and order placement
//!
//! Quote phase is read-only and safe to repeat; the checkout commit phase
//! converts a session cart into an order exactly once.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod domain;
pub mod error;
pub mod shipping;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub nats: Option<async_nats::Client>,
}
