//! HTTP surface of the admin dashboard.

pub mod error;
mod handlers;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use cryptobot_core::config::ApiConfig;
use cryptobot_core::Dashboard;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Dashboard,
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return Ok(cors.allow_origin(Any));
    }
    let origins = allowed_origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(cors.allow_origin(origins))
}

pub fn router(state: AppState, api: &ApiConfig) -> Result<Router> {
    let api_routes = Router::new()
        .route("/stats", get(handlers::stats))
        .route(
            "/wallets",
            get(handlers::list_wallets).post(handlers::create_wallet),
        )
        .route(
            "/wallets/:id",
            get(handlers::get_wallet)
                .patch(handlers::update_wallet)
                .delete(handlers::delete_wallet),
        )
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/transactions/:id",
            get(handlers::get_transaction).patch(handlers::update_transaction),
        )
        .route(
            "/webhook-config",
            get(handlers::get_webhook_config)
                .post(handlers::save_webhook_config)
                .patch(handlers::patch_webhook_config),
        )
        .route(
            "/bot-settings",
            get(handlers::get_bot_settings)
                .post(handlers::save_bot_settings)
                .patch(handlers::patch_bot_settings),
        );

    let app = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors_layer(&api.allowed_origins)?)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}
