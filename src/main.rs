//! shipgate — shipping rate resolution and order placement service

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Json, Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipgate::{cart, catalog, checkout, shipping, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&std::env::var("DATABASE_URL")?)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match std::env::var("NATS_URL") {
        Ok(url) => match async_nats::connect(&url).await {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(%err, "NATS unavailable, order events disabled");
                None
            }
        },
        Err(_) => None,
    };
    let state = AppState { db, nats };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "shipgate"})) }))
        // Admin catalog
        .route("/api/v1/shipping/zones", get(catalog::zones::list_zones).post(catalog::zones::create_zone))
        .route(
            "/api/v1/shipping/zones/:id",
            get(catalog::zones::get_zone).put(catalog::zones::update_zone).delete(catalog::zones::delete_zone),
        )
        .route("/api/v1/shipping/zones/:id/countries", put(catalog::zones::set_zone_countries))
        .route(
            "/api/v1/shipping/zones/:id/gateways",
            get(catalog::links::list_zone_gateways).post(catalog::links::link_gateway),
        )
        .route(
            "/api/v1/shipping/zones/:id/gateways/:gateway_id",
            put(catalog::links::update_link).delete(catalog::links::unlink_gateway),
        )
        .route("/api/v1/shipping/gateways", get(catalog::gateways::list_gateways).post(catalog::gateways::create_gateway))
        .route(
            "/api/v1/shipping/gateways/:id",
            get(catalog::gateways::get_gateway)
                .put(catalog::gateways::update_gateway)
                .delete(catalog::gateways::delete_gateway),
        )
        .route("/api/v1/shipping/methods", get(catalog::methods::list_methods).post(catalog::methods::create_method))
        .route(
            "/api/v1/shipping/methods/:id",
            get(catalog::methods::get_method).put(catalog::methods::update_method).delete(catalog::methods::delete_method),
        )
        // Storefront quote phase
        .route("/api/v1/shipping/coverage", get(shipping::zone_coverage))
        .route("/api/v1/shipping/options/:session", get(shipping::shipping_options))
        .route("/api/v1/shipping/calculate", post(shipping::calculate_rates))
        // Carts
        .route("/api/v1/cart/:session", get(cart::get_cart).delete(cart::clear_cart))
        .route("/api/v1/cart/:session/items", post(cart::add_item))
        .route("/api/v1/cart/:session/items/:id", put(cart::update_item).delete(cart::remove_item))
        // Commit phase
        .route("/api/v1/checkout/:session", post(checkout::place_order))
        .route("/api/v1/payments/:id", put(checkout::update_payment))
        .route("/api/v1/orders", get(checkout::list_orders))
        .route("/api/v1/orders/:id", get(checkout::get_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8083".to_string());
    tracing::info!("🚀 shipgate listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}
