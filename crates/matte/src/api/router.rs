//! Axum router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth;
use crate::config::GatewayConfig;
use crate::remover::BackgroundRemover;

use super::{batch, health, images};

/// Preflight cache lifetime granted to browsers.
const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub remover: Arc<dyn BackgroundRemover>,
}

/// Create the gateway router with all routes.
pub fn create_router(config: Arc<GatewayConfig>, remover: Arc<dyn BackgroundRemover>) -> Router {
    let state = AppState { config, remover };

    let images = Router::new()
        .route(&state.config.route("/remove-bg"), post(images::remove_bg))
        .route(
            &state.config.route("/remove-bg-base64"),
            post(images::remove_bg_base64),
        )
        .route(
            &state.config.route("/remove-bg-batch"),
            post(batch::remove_bg_batch),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_credential,
        ));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .merge(images)
        .fallback(health::not_found)
        // Payload limits are enforced per image by the handlers.
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any)
                .max_age(CORS_MAX_AGE),
        )
        .with_state(state)
}
